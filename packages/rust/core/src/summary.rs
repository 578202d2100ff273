//! Natural-language summary of an analysis report.
//!
//! The report is condensed into a [`SummaryInput`] (top terms per category),
//! handed to a [`TextGenerator`], and the result cached under the run's
//! `summary` key. Generation failures never fail the run.

use std::future::Future;

use serde::Serialize;
use tracing::{info, instrument, warn};

use jobsignal_shared::{
    AnalysisReport, CacheStatus, JobSignalError, Result, SummaryConfig, sha256_hex,
};
use jobsignal_storage::{
    Artifact, CacheEntry, GenerationParams, ReportStore, StoreKey, compute_input_fingerprint,
    resolve,
};

/// Artifact name for generated summaries.
pub const SUMMARY_ARTIFACT: &str = "summary";

// ---------------------------------------------------------------------------
// Generation capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub input: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub system_prompt: String,
}

/// Produces text from structured input.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest)
    -> impl Future<Output = Result<String>> + Send;
}

/// Placeholder generator for runs without summaries.
pub struct NoSummary;

impl TextGenerator for NoSummary {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(JobSignalError::Generation(
            "no text generator configured".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Summary input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTerm {
    pub term: String,
    pub presence: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCategory {
    pub label: String,
    pub presence: usize,
    pub percentage: f64,
    pub average_score: f64,
    pub top_terms: Vec<SummaryTerm>,
}

/// Compact, deterministic view of a report given to the generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryInput {
    pub total_postings: usize,
    pub postings_without_text: usize,
    pub categories: Vec<SummaryCategory>,
}

impl SummaryInput {
    pub fn to_prompt_input(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Keep the `top_n` highest-scoring terms of each category that was seen.
pub fn build_summary_input(report: &AnalysisReport, top_n: usize) -> SummaryInput {
    let categories = report
        .categories
        .iter()
        .filter(|c| c.presence > 0)
        .map(|c| SummaryCategory {
            label: c.label.clone(),
            presence: c.presence,
            percentage: c.percentage,
            average_score: c.average_score,
            top_terms: c
                .terms
                .iter()
                .take(top_n)
                .map(|t| SummaryTerm {
                    term: t.term.clone(),
                    presence: t.presence,
                    average_score: t.average_score,
                })
                .collect(),
        })
        .collect();

    SummaryInput {
        total_postings: report.meta.total_postings,
        postings_without_text: report.meta.postings_without_text,
        categories,
    }
}

// ---------------------------------------------------------------------------
// Cached generation
// ---------------------------------------------------------------------------

/// What happened to the summary during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    /// Cache status observed before any regeneration.
    pub status: CacheStatus,
    /// Current summary, or the stale one when regeneration failed.
    pub text: Option<String>,
    /// A new summary was generated in this run.
    pub generated: bool,
    pub error: Option<String>,
}

pub fn generation_params(config: &SummaryConfig) -> GenerationParams {
    GenerationParams {
        model: config.model.clone(),
        max_output_tokens: config.max_output_tokens,
        system_prompt_digest: sha256_hex(config.system_prompt.as_bytes()),
    }
}

/// Reuse the cached summary when current; otherwise generate and store one.
#[instrument(skip_all, fields(%key, model = %config.model))]
pub async fn summarize<G, S>(
    report: &AnalysisReport,
    config: &SummaryConfig,
    generator: &G,
    store: &S,
    key: &StoreKey,
) -> SummaryOutcome
where
    G: TextGenerator,
    S: ReportStore,
{
    let input = build_summary_input(report, config.top_terms_per_category).to_prompt_input();
    let params = generation_params(config);

    let fingerprint = match compute_input_fingerprint(&input, SUMMARY_ARTIFACT, &params) {
        Ok(fp) => fp,
        Err(e) => {
            return SummaryOutcome {
                status: CacheStatus::Absent,
                text: None,
                generated: false,
                error: Some(e.to_string()),
            };
        }
    };

    let stored = store.load(key).await.unwrap_or_else(|e| {
        warn!(error = %e, "summary cache unavailable");
        None
    });
    let resolution = resolve(stored, &fingerprint);
    let stale = resolution
        .artifact
        .as_ref()
        .and_then(Artifact::as_text)
        .map(str::to_string);

    if resolution.status == CacheStatus::Current {
        info!("reusing cached summary");
        return SummaryOutcome {
            status: CacheStatus::Current,
            text: stale,
            generated: false,
            error: None,
        };
    }

    let request = GenerationRequest {
        input,
        model: config.model.clone(),
        max_output_tokens: config.max_output_tokens,
        system_prompt: config.system_prompt.clone(),
    };

    let generated = match generator.generate(&request).await {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        Ok(_) => Err(JobSignalError::Generation("generator returned empty text".into())),
        Err(e) => Err(e),
    };

    match generated {
        Ok(text) => {
            let entry = CacheEntry::new(fingerprint, Artifact::Text(text.clone()))
                .with_generation_params(params);
            if let Err(e) = store.save(key, &entry).await {
                warn!(error = %e, "failed to cache summary");
            }
            info!(previous = %resolution.status, chars = text.len(), "summary generated");
            SummaryOutcome {
                status: resolution.status,
                text: Some(text),
                generated: true,
                error: None,
            }
        }
        Err(e) => {
            warn!(error = %e, status = %resolution.status, "summary generation failed");
            SummaryOutcome {
                status: resolution.status,
                text: stale,
                generated: false,
                error: Some(e.to_string()),
            }
        }
    }
}
