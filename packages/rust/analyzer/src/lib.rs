//! Requirement analysis for jobsignal.
//!
//! Scans posting text for every [`Catalog`] term, weights each surviving
//! match by where it sits ([`ContextPolicy`]), and aggregates per-term and
//! per-category scores into an [`AnalysisReport`].
//!
//! Presence counts postings, not matches: a posting that mentions a term
//! five times adds 1 to its presence. Scores accumulate per match under
//! [`MatchAggregation::Sum`] or keep the strongest match under
//! [`MatchAggregation::Strongest`].

pub mod catalog;
pub mod context;
pub mod document;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use jobsignal_shared::{
    AnalysisReport, AnalysisSettings, CategoryScore, MatchAggregation, Posting, ReportMeta,
    Result, TermScore, WeightClass,
};

pub use catalog::{
    Catalog, Category, Term, TermGate, TermMatcher, default_negative_phrases, load_catalog,
};
pub use context::{ContextPolicy, KeywordWindowPolicy, SectionPolicy, policy_for};
pub use document::Document;

use catalog::{CompiledTerm, compile};

/// One weighted occurrence of a term.
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    pub start: usize,
    pub end: usize,
    pub class: WeightClass,
}

/// A term's surviving matches within one posting.
#[derive(Debug, Clone, PartialEq)]
pub struct TermHit {
    pub category: usize,
    pub term: usize,
    pub matches: Vec<TermMatch>,
    /// Posting-level score after aggregation.
    pub score: f64,
}

/// Compiled catalog plus analysis settings, reusable across runs.
pub struct Analyzer {
    catalog: Catalog,
    digest: String,
    terms: Vec<Vec<CompiledTerm>>,
    negative_phrases: Vec<String>,
    policy: Box<dyn ContextPolicy>,
    settings: AnalysisSettings,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("catalog_version", &self.catalog.version)
            .field("terms", &self.catalog.term_count())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Analyzer {
    /// Validate and compile `catalog`. Invalid patterns are a config error.
    pub fn new(catalog: Catalog, settings: &AnalysisSettings) -> Result<Self> {
        catalog.validate()?;
        let terms = compile(&catalog)?;
        let policy = policy_for(settings.context_policy);
        Ok(Self::assemble(catalog, terms, policy, settings))
    }

    /// Use a custom context policy instead of the configured one.
    pub fn with_policy(
        catalog: Catalog,
        settings: &AnalysisSettings,
        policy: Box<dyn ContextPolicy>,
    ) -> Result<Self> {
        catalog.validate()?;
        let terms = compile(&catalog)?;
        Ok(Self::assemble(catalog, terms, policy, settings))
    }

    fn assemble(
        catalog: Catalog,
        terms: Vec<Vec<CompiledTerm>>,
        policy: Box<dyn ContextPolicy>,
        settings: &AnalysisSettings,
    ) -> Self {
        let negative_phrases = catalog
            .negative_phrases
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            digest: catalog.digest(),
            catalog,
            terms,
            negative_phrases,
            policy,
            settings: settings.clone(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_digest(&self) -> &str {
        &self.digest
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Text analyzed for `posting`, or `None` when it has none.
    pub fn text_for<'p>(&self, posting: &'p Posting) -> Option<&'p str> {
        if let Some(full) = posting
            .full_description
            .as_deref()
            .filter(|f| !f.trim().is_empty())
        {
            return Some(full);
        }
        if self.settings.use_summary_fallback && !posting.description.trim().is_empty() {
            return Some(&posting.description);
        }
        None
    }

    /// Every term with at least one surviving match in `raw`, in catalog order.
    pub fn analyze_text(&self, raw: &str) -> Vec<TermHit> {
        let doc = Document::new(raw);
        if doc.is_blank() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for (ci, category) in self.terms.iter().enumerate() {
            for (ti, term) in category.iter().enumerate() {
                let matches: Vec<TermMatch> = term
                    .regex
                    .find_iter(doc.text())
                    .filter(|m| self.admits(&doc, term, m.range()))
                    .map(|m| TermMatch {
                        start: m.start(),
                        end: m.end(),
                        class: if term.perk {
                            WeightClass::Bonus
                        } else {
                            self.policy.classify(&doc, m.range())
                        },
                    })
                    .collect();

                if matches.is_empty() {
                    continue;
                }
                let score = aggregate(&matches, self.settings.aggregation);
                hits.push(TermHit {
                    category: ci,
                    term: ti,
                    matches,
                    score,
                });
            }
        }
        hits
    }

    fn admits(&self, doc: &Document, term: &CompiledTerm, span: std::ops::Range<usize>) -> bool {
        let near = doc.line_window(span.clone(), self.settings.negative_window_chars);
        if self.negative_phrases.iter().any(|p| near.contains(p.as_str())) {
            return false;
        }
        if term.gate.is_empty() {
            return true;
        }
        term.gate
            .admits(doc.window(span, self.settings.gate_window_chars))
    }

    /// Analyze a deduplicated posting set.
    ///
    /// Postings without analyzable text still count toward `total_postings`
    /// and are reported in `postings_without_text`.
    #[instrument(skip_all, fields(postings = postings.len(), catalog = %self.catalog.version))]
    pub fn analyze(&self, postings: &[Posting]) -> AnalysisReport {
        let mut tallies: Vec<Vec<TermTally>> = self
            .terms
            .iter()
            .map(|c| vec![TermTally::default(); c.len()])
            .collect();
        let mut category_presence = vec![0usize; self.terms.len()];
        let mut without_text = 0usize;

        for (pi, posting) in postings.iter().enumerate() {
            let Some(text) = self.text_for(posting) else {
                debug!(index = pi, url = %posting.url, "posting has no analyzable text");
                without_text += 1;
                continue;
            };

            let hits = self.analyze_text(text);
            let mut touched = vec![false; self.terms.len()];
            for hit in hits {
                let tally = &mut tallies[hit.category][hit.term];
                tally.presence += 1;
                tally.total += hit.score;
                tally.postings.push(pi);
                touched[hit.category] = true;
            }
            for (ci, hit) in touched.into_iter().enumerate() {
                if hit {
                    category_presence[ci] += 1;
                }
            }
        }

        if without_text > 0 {
            warn!(
                without_text,
                total = postings.len(),
                "postings without analyzable text"
            );
        }

        let total = postings.len();
        let categories: Vec<CategoryScore> = self
            .catalog
            .categories
            .iter()
            .zip(tallies)
            .zip(category_presence)
            .map(|((category, term_tallies), presence)| {
                build_category(category, term_tallies, presence, total)
            })
            .collect();

        info!(
            total,
            without_text,
            categories_present = categories.iter().filter(|c| c.presence > 0).count(),
            "analysis completed"
        );

        AnalysisReport {
            meta: ReportMeta {
                total_postings: total,
                postings_without_text: without_text,
                catalog_version: self.catalog.version.clone(),
                catalog_digest: self.digest.clone(),
                generated_at: Utc::now(),
            },
            categories,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TermTally {
    presence: usize,
    total: f64,
    postings: Vec<usize>,
}

fn aggregate(matches: &[TermMatch], mode: MatchAggregation) -> f64 {
    let weights = matches.iter().map(|m| m.class.weight());
    match mode {
        MatchAggregation::Sum => weights.sum(),
        MatchAggregation::Strongest => weights.fold(0.0, f64::max),
    }
}

fn average(total: f64, presence: usize) -> f64 {
    if presence == 0 { 0.0 } else { total / presence as f64 }
}

fn build_category(
    category: &Category,
    tallies: Vec<TermTally>,
    presence: usize,
    total_postings: usize,
) -> CategoryScore {
    let total_score: f64 = tallies.iter().map(|t| t.total).sum();

    let mut terms: Vec<TermScore> = category
        .terms
        .iter()
        .zip(tallies)
        .filter(|(_, tally)| tally.presence > 0)
        .map(|(term, tally)| TermScore {
            term: term.name.clone(),
            presence: tally.presence,
            total_score: tally.total,
            average_score: average(tally.total, tally.presence),
            postings: tally.postings,
        })
        .collect();
    // Stable: equal totals keep catalog order.
    terms.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));

    let percentage = if total_postings == 0 {
        0.0
    } else {
        presence as f64 / total_postings as f64 * 100.0
    };

    CategoryScore {
        key: category.key.clone(),
        label: category.label.clone(),
        presence,
        percentage,
        total_score,
        average_score: average(total_score, presence),
        terms,
    }
}
