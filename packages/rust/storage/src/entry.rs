//! Cache entries, store keys and freshness resolution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use jobsignal_shared::{AnalysisReport, CacheStatus, InputFingerprint, JobSignalError, Result};

/// Schema version written into every cache entry.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// StoreKey
// ---------------------------------------------------------------------------

/// Where an artifact lives: a reporting scope plus an artifact name, joined
/// by `__`. Segments may not contain `__` or start or end with `_`, so the
/// join is unambiguous.
///
/// Unrelated to [`InputFingerprint`]: the key says *which* artifact, the
/// fingerprint says *what it was derived from*.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(scope: &str, artifact: &str) -> Result<Self> {
        validate_segment(scope, "scope")?;
        validate_segment(artifact, "artifact name")?;
        Ok(Self(format!("{scope}__{artifact}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_segment(segment: &str, what: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(JobSignalError::validation(format!("store key {what} is empty")));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(JobSignalError::validation(format!(
            "store key {what} '{segment}' contains invalid character '{bad}'"
        )));
    }
    if segment.contains("__") || segment.starts_with('_') || segment.ends_with('_') {
        return Err(JobSignalError::validation(format!(
            "store key {what} '{segment}' must not contain '__' or start or end with '_'"
        )));
    }
    if segment.starts_with('.') {
        return Err(JobSignalError::validation(format!(
            "store key {what} '{segment}' must not start with '.'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// A stored derived artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Report(AnalysisReport),
    Text(String),
}

impl Artifact {
    /// Empty artifacts never count as a usable cache hit.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Report(report) => report.categories.is_empty(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }

    pub fn as_report(&self) -> Option<&AnalysisReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Report(_) => None,
        }
    }
}

/// Generation parameters recorded with generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_output_tokens: u32,
    pub system_prompt_digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: u32,
    pub input_fingerprint: InputFingerprint,
    pub artifact: Artifact,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_params: Option<GenerationParams>,
}

impl CacheEntry {
    pub fn new(input_fingerprint: InputFingerprint, artifact: Artifact) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            input_fingerprint,
            artifact,
            created_at: Utc::now(),
            generation_params: None,
        }
    }

    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.generation_params = Some(params);
        self
    }

    /// Decode a stored entry, rejecting unknown schema versions.
    pub fn decode(key: &StoreKey, bytes: &[u8]) -> Result<Self> {
        let entry: CacheEntry = serde_json::from_slice(bytes)
            .map_err(|e| JobSignalError::cache_corrupt(key.as_str(), e.to_string()))?;
        if entry.schema_version != CACHE_SCHEMA_VERSION {
            return Err(JobSignalError::cache_corrupt(
                key.as_str(),
                format!(
                    "schema version {} (expected {CACHE_SCHEMA_VERSION})",
                    entry.schema_version
                ),
            ));
        }
        Ok(entry)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| JobSignalError::Storage(format!("failed to encode cache entry: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting and resolution
// ---------------------------------------------------------------------------

/// Digest of `{input, identity, config}` as canonical JSON (sorted keys).
pub fn compute_input_fingerprint<I, D, C>(
    input: &I,
    identity: &D,
    config: &C,
) -> Result<InputFingerprint>
where
    I: Serialize + ?Sized,
    D: Serialize + ?Sized,
    C: Serialize + ?Sized,
{
    let to_value = |v: serde_json::Result<serde_json::Value>| {
        v.map_err(|e| JobSignalError::validation(format!("fingerprint input not serializable: {e}")))
    };
    // serde_json::Map is a BTreeMap here, so object keys serialize sorted.
    let canonical = json!({
        "input": to_value(serde_json::to_value(input))?,
        "identity": to_value(serde_json::to_value(identity))?,
        "config": to_value(serde_json::to_value(config))?,
    });
    let bytes = serde_json::to_vec(&canonical)
        .map_err(|e| JobSignalError::validation(format!("fingerprint encoding failed: {e}")))?;
    Ok(InputFingerprint::of_bytes(&bytes))
}

/// A resolved artifact and whether it reflects the current input.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub artifact: Option<Artifact>,
    pub status: CacheStatus,
}

impl Resolution {
    pub fn absent() -> Self {
        Self {
            artifact: None,
            status: CacheStatus::Absent,
        }
    }
}

/// Compare a stored entry against the fingerprint of the current input.
pub fn resolve(entry: Option<CacheEntry>, fresh: &InputFingerprint) -> Resolution {
    let Some(entry) = entry else {
        return Resolution::absent();
    };
    if entry.artifact.is_empty() {
        return Resolution::absent();
    }
    let status = if &entry.input_fingerprint == fresh {
        CacheStatus::Current
    } else {
        CacheStatus::Outdated
    };
    Resolution {
        artifact: Some(entry.artifact),
        status,
    }
}
