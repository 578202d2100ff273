//! Text normalization and comparison keys for duplicate detection.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use jobsignal_shared::{Fingerprint, Posting};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Company/title placeholders that carry no identity.
const AMBIGUOUS_VALUES: &[&str] = &["", "not specified", "unknown", "confidential", "na", "n a"];

/// NFKC, lowercase, strip punctuation, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    let stripped = NON_WORD.replace_all(&folded, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Metro areas
// ---------------------------------------------------------------------------

/// A metro area and the normalized place names that fold into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metro {
    pub name: String,
    pub members: Vec<String>,
}

impl Metro {
    pub fn new(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

/// Metro tables for the Australian listing sites.
pub fn default_metros() -> Vec<Metro> {
    vec![
        Metro::new(
            "sydney",
            &[
                "sydney",
                "auburn",
                "bankstown",
                "parramatta",
                "marrickville",
                "rydalmere",
                "villawood",
                "macquarie park",
                "st leonards",
                "riverwood",
                "milsons point",
                "wetherill park",
            ],
        ),
        Metro::new("melbourne", &["melbourne"]),
        Metro::new("brisbane", &["brisbane"]),
    ]
}

/// Fold a location into its metro area when any member name appears in it.
pub fn canonical_location(location: &str, metros: &[Metro]) -> String {
    let normalized = normalize_text(location);
    metros
        .iter()
        .find(|metro| metro.members.iter().any(|m| normalized.contains(m.as_str())))
        .map(|metro| metro.name.clone())
        .unwrap_or(normalized)
}

// ---------------------------------------------------------------------------
// Comparison key
// ---------------------------------------------------------------------------

/// Read-only normalized view of a posting, used only for fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    /// Present only when title or company cannot identify the posting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NormalizedPosting {
    pub fn from_posting(posting: &Posting, metros: &[Metro], description_prefix_chars: usize) -> Self {
        let title = normalize_text(&posting.title);
        let company = normalize_text(&posting.company);
        let location = canonical_location(&posting.location, metros);

        let ambiguous = is_ambiguous(&title) || is_ambiguous(&company);
        let description = ambiguous.then(|| {
            normalize_text(&posting.description)
                .chars()
                .take(description_prefix_chars)
                .collect()
        });

        Self {
            title,
            company,
            location,
            description,
        }
    }

    /// SHA-256 over the canonical JSON of this key.
    pub fn fingerprint(&self) -> Fingerprint {
        // Serializing a struct of strings cannot fail.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        Fingerprint::of_bytes(&canonical)
    }
}

fn is_ambiguous(normalized: &str) -> bool {
    AMBIGUOUS_VALUES.contains(&normalized)
}
