//! Core domain types for postings, fingerprints and analysis reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-256 of `data` as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// PostingRef / Posting
// ---------------------------------------------------------------------------

/// Opaque reference used to request a posting's detail (usually its URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingRef(String);

impl PostingRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostingRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a posting is in its detail lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStatus {
    /// Listing summary only; detail not yet requested.
    #[default]
    Pending,
    /// Full description retrieved.
    Fetched,
    /// Every fetch attempt failed.
    Failed,
    /// Never submitted (over the detail cap, cancelled, or past the deadline).
    NotFetched,
}

/// A single job posting as harvested from a listing site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub url: PostingRef,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    /// Short listing description.
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_description: Option<String>,
    /// Listing site tag, e.g. `seek`.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_posted: Option<String>,
    #[serde(default)]
    pub detail: DetailStatus,
}

impl Posting {
    /// A listing stub with no detail yet.
    pub fn stub(
        url: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            url: PostingRef::new(url),
            title: title.into(),
            company: company.into(),
            location: location.into(),
            salary: None,
            description: String::new(),
            full_description: None,
            source: String::new(),
            date_posted: None,
            detail: DetailStatus::Pending,
        }
    }

    /// Builder-style helper to set the short description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder-style helper to attach an already-known full description.
    pub fn with_full_description(mut self, full: impl Into<String>) -> Self {
        self.full_description = Some(full.into());
        self.detail = DetailStatus::Fetched;
        self
    }

    /// True when a non-blank full description is present.
    pub fn has_full_description(&self) -> bool {
        self.full_description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// Put a posting without full text back to `pending` so a new fetch can
    /// record its outcome. Postings that already carry text are left alone.
    pub fn reopen_detail(&mut self) -> bool {
        if self.has_full_description() || self.detail == DetailStatus::Pending {
            return false;
        }
        self.full_description = None;
        self.detail = DetailStatus::Pending;
        true
    }

    /// Record a successful detail fetch. Only a pending posting transitions.
    pub fn mark_fetched(&mut self, detail: String) -> bool {
        if self.detail != DetailStatus::Pending {
            return false;
        }
        self.full_description = Some(detail);
        self.detail = DetailStatus::Fetched;
        true
    }

    /// Record a terminal fetch failure. Summary fields are retained.
    pub fn mark_failed(&mut self) -> bool {
        self.transition(DetailStatus::Failed)
    }

    /// Record that detail was never requested.
    pub fn mark_not_fetched(&mut self) -> bool {
        self.transition(DetailStatus::NotFetched)
    }

    fn transition(&mut self, to: DetailStatus) -> bool {
        if self.detail != DetailStatus::Pending {
            return false;
        }
        self.detail = to;
        true
    }
}

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// Content fingerprint of a posting's normalized comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest arbitrary canonical bytes.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(sha256_hex(data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of everything that determines a cached artifact's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputFingerprint(String);

impl InputFingerprint {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(sha256_hex(data))
    }

    /// Wrap a previously computed hex digest (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InputFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Freshness of a cached artifact relative to the current input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Stored fingerprint matches; the artifact can be reused.
    Current,
    /// An artifact exists but was derived from different input.
    Outdated,
    /// Nothing usable is stored.
    Absent,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Outdated => "outdated",
            Self::Absent => "absent",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Weighting
// ---------------------------------------------------------------------------

/// How strongly a term occurrence signals a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightClass {
    Required,
    Preferred,
    Bonus,
    Context,
}

impl WeightClass {
    /// Numeric weight contributed by one match of this class.
    pub const fn weight(self) -> f64 {
        match self {
            Self::Required => 1.0,
            Self::Preferred => 0.8,
            Self::Bonus => 0.5,
            Self::Context => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Bonus => "bonus",
            Self::Context => "context",
        }
    }
}

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

/// Aggregate score for a single catalog term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermScore {
    pub term: String,
    /// Postings with at least one surviving match.
    pub presence: usize,
    pub total_score: f64,
    /// `total_score / presence`, or 0 when absent.
    pub average_score: f64,
    /// Indices (into the analyzed set) of postings that matched.
    #[serde(default)]
    pub postings: Vec<usize>,
}

/// Aggregate score for a catalog category with term drill-down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub key: String,
    pub label: String,
    pub presence: usize,
    /// Share of analyzed postings containing the category, 0..=100.
    pub percentage: f64,
    pub total_score: f64,
    pub average_score: f64,
    /// Matched terms, highest total score first.
    pub terms: Vec<TermScore>,
}

impl CategoryScore {
    pub fn term(&self, name: &str) -> Option<&TermScore> {
        self.terms.iter().find(|t| t.term == name)
    }
}

/// Metadata recorded alongside every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub total_postings: usize,
    /// Postings counted in totals that had no analyzable text.
    pub postings_without_text: usize,
    pub catalog_version: String,
    pub catalog_digest: String,
    pub generated_at: DateTime<Utc>,
}

/// Category-ordered analysis of a deduplicated posting set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub meta: ReportMeta,
    pub categories: Vec<CategoryScore>,
}

impl AnalysisReport {
    pub fn category(&self, key: &str) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.key == key)
    }
}
