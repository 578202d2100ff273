//! Requirement catalog: categories, terms and their matchers.
//!
//! Catalogs are plain TOML. The built-in catalog ships with the crate; users
//! can point `analysis.catalog_path` at their own file.

use std::collections::HashSet;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use jobsignal_shared::{JobSignalError, Result, sha256_hex};

const BUILTIN_CATALOG: &str = include_str!("builtin_catalog.toml");

/// Phrases that disqualify a nearby match unless a catalog overrides them.
pub fn default_negative_phrases() -> Vec<String> {
    [
        "not required",
        "not essential",
        "not necessary",
        "not mandatory",
        "not needed",
        "not a requirement",
        "no need for",
        "isn't required",
        "is not required",
        "don't need",
        "do not need",
        "no experience necessary",
        "no experience required",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Catalog model
// ---------------------------------------------------------------------------

/// The full taxonomy searched for in posting text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    #[serde(default = "default_negative_phrases")]
    pub negative_phrases: Vec<String>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: String,
    pub label: String,
    /// Every term in this category is a perk (always weighted `bonus`).
    #[serde(default)]
    pub perk: bool,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    pub matcher: TermMatcher,
    #[serde(default)]
    pub perk: bool,
    #[serde(default, skip_serializing_if = "TermGate::is_empty")]
    pub gate: TermGate,
}

/// How a term is located in text. Matching is always case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermMatcher {
    /// Literal phrase, word-bounded where the phrase starts/ends with a word character.
    Phrase(String),
    /// Regular expression.
    Regex(String),
    /// Structured identifiers such as `AZ-104`: one of `prefixes`, a dash, `digits` digits.
    Code { prefixes: Vec<String>, digits: usize },
}

impl TermMatcher {
    fn pattern(&self) -> String {
        match self {
            Self::Phrase(phrase) => {
                let escaped = regex::escape(phrase.trim());
                let lead = if starts_with_word_char(phrase.trim()) { r"\b" } else { "" };
                let trail = if ends_with_word_char(phrase.trim()) { r"\b" } else { "" };
                format!("{lead}{escaped}{trail}")
            }
            Self::Regex(pattern) => pattern.clone(),
            Self::Code { prefixes, digits } => {
                let alternatives: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
                format!(r"\b(?:{})-\d{{{digits}}}\b", alternatives.join("|"))
            }
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Phrase(s) | Self::Regex(s) => s.trim().is_empty(),
            Self::Code { prefixes, digits } => prefixes.is_empty() || *digits == 0,
        }
    }
}

fn starts_with_word_char(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn ends_with_word_char(s: &str) -> bool {
    s.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// Term-specific gating phrases, checked in the gate window around a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermGate {
    /// Discard the match when any of these is nearby...
    #[serde(default)]
    pub suppress_near: Vec<String>,
    /// ...unless one of these is also nearby.
    #[serde(default)]
    pub unless_near: Vec<String>,
    /// Keep the match only when one of these is nearby.
    #[serde(default)]
    pub require_near: Vec<String>,
}

impl TermGate {
    pub fn is_empty(&self) -> bool {
        self.suppress_near.is_empty() && self.unless_near.is_empty() && self.require_near.is_empty()
    }

    /// Whether a match with lowercase surrounding `window` survives this gate.
    pub fn admits(&self, window: &str) -> bool {
        let near = |phrases: &[String]| phrases.iter().any(|p| window.contains(p.as_str()));

        if !self.require_near.is_empty() && !near(&self.require_near) {
            return false;
        }
        if near(&self.suppress_near) && !near(&self.unless_near) {
            return false;
        }
        true
    }
}

impl Catalog {
    /// The catalog shipped with jobsignal.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse and validate a catalog from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(content)
            .map_err(|e| JobSignalError::config(format!("invalid catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Stable digest of the catalog's full content.
    pub fn digest(&self) -> String {
        sha256_hex(&serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn term_count(&self) -> usize {
        self.categories.iter().map(|c| c.terms.len()).sum()
    }

    /// Structural checks. Regex compilation is checked by [`compile`].
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(JobSignalError::config("catalog version must not be empty"));
        }
        if self.categories.is_empty() {
            return Err(JobSignalError::config("catalog has no categories"));
        }

        let mut keys = HashSet::new();
        for category in &self.categories {
            if !keys.insert(category.key.as_str()) {
                return Err(JobSignalError::config(format!(
                    "duplicate category key '{}'",
                    category.key
                )));
            }
            if category.terms.is_empty() {
                return Err(JobSignalError::config(format!(
                    "category '{}' has no terms",
                    category.key
                )));
            }
            let mut names = HashSet::new();
            for term in &category.terms {
                if !names.insert(term.name.as_str()) {
                    return Err(JobSignalError::config(format!(
                        "duplicate term '{}' in category '{}'",
                        term.name, category.key
                    )));
                }
                if term.matcher.is_blank() {
                    return Err(JobSignalError::config(format!(
                        "term '{}' has an empty matcher",
                        term.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load a catalog from a TOML file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path).map_err(|e| JobSignalError::io(path, e))?;
    Catalog::from_toml_str(&content)
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A term with its regex built.
#[derive(Debug, Clone)]
pub(crate) struct CompiledTerm {
    pub regex: Regex,
    pub perk: bool,
    pub gate: TermGate,
}

/// Compile every term, in catalog order.
pub(crate) fn compile(catalog: &Catalog) -> Result<Vec<Vec<CompiledTerm>>> {
    catalog
        .categories
        .iter()
        .map(|category| {
            category
                .terms
                .iter()
                .map(|term| {
                    let pattern = term.matcher.pattern();
                    let regex = RegexBuilder::new(&pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            JobSignalError::config(format!(
                                "term '{}' in '{}' has an invalid pattern: {e}",
                                term.name, category.key
                            ))
                        })?;
                    Ok(CompiledTerm {
                        regex,
                        perk: term.perk || category.perk,
                        gate: TermGate {
                            suppress_near: lowercase_all(&term.gate.suppress_near),
                            unless_near: lowercase_all(&term.gate.unless_near),
                            require_near: lowercase_all(&term.gate.require_near),
                        },
                    })
                })
                .collect()
        })
        .collect()
}

fn lowercase_all(phrases: &[String]) -> Vec<String> {
    phrases.iter().map(|p| p.to_lowercase()).collect()
}
