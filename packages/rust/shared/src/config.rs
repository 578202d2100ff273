//! Application configuration for jobsignal.
//!
//! User config lives at `~/.jobsignal/jobsignal.toml`.
//! CLI flags override config file values, which override defaults.
//! The pipeline itself only ever sees a validated [`RunConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JobSignalError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobsignal.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobsignal";

/// Upper bound on concurrent fetch workers.
pub const MAX_WORKERS: usize = 256;

/// Upper bound on retries per reference.
pub const MAX_RETRIES: u32 = 10;

// ---------------------------------------------------------------------------
// Config structs (matching jobsignal.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fetch: FetchSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub analysis: AnalysisSection,

    #[serde(default)]
    pub summary: SummarySection,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Concurrent detail workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout applied to every individual fetch call.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Cap on how many postings get a detail fetch. Unset means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_details: Option<usize>,

    /// Overall deadline for the fetch stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,

    /// CSS selectors tried in order when extracting a description.
    #[serde(default = "default_detail_selectors")]
    pub detail_selectors: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            max_retries: default_max_retries(),
            backoff: BackoffStrategy::default(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_details: None,
            run_deadline_secs: None,
            detail_selectors: default_detail_selectors(),
        }
    }
}

fn default_workers() -> usize {
    10
}
fn default_per_call_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    10_000
}

/// Selectors for the description container on common listing sites.
pub fn default_detail_selectors() -> Vec<String> {
    [
        "[data-automation='jobAdDetails']",
        "[data-automation='jobDescription']",
        "#job-description-container",
        "#job-description",
        ".job-description",
        "[class*='jobDescription']",
        "article",
        "main",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Deduplicate listing stubs before fetching detail.
    #[serde(default)]
    pub dedupe_before_details: bool,

    /// Root directory for persisted run layouts. Unset disables persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// Normalized description prefix used for ambiguous postings.
    #[serde(default = "default_description_prefix_chars")]
    pub description_prefix_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            dedupe_before_details: false,
            output_dir: None,
            description_prefix_chars: default_description_prefix_chars(),
        }
    }
}

fn default_description_prefix_chars() -> usize {
    300
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub context_policy: ContextPolicyKind,

    #[serde(default)]
    pub aggregation: MatchAggregation,

    /// Characters either side of a match scanned for negations.
    #[serde(default = "default_negative_window_chars")]
    pub negative_window_chars: usize,

    /// Characters either side of a match scanned for term-level gates.
    #[serde(default = "default_gate_window_chars")]
    pub gate_window_chars: usize,

    /// Analyze the short description when no full text was fetched.
    #[serde(default)]
    pub use_summary_fallback: bool,

    /// Custom catalog file. Unset uses the built-in catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<String>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            context_policy: ContextPolicyKind::default(),
            aggregation: MatchAggregation::default(),
            negative_window_chars: default_negative_window_chars(),
            gate_window_chars: default_gate_window_chars(),
            use_summary_fallback: false,
            catalog_path: None,
        }
    }
}

fn default_negative_window_chars() -> usize {
    40
}
fn default_gate_window_chars() -> usize {
    200
}

/// `[summary]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarySection {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Terms per category included in the summary input.
    #[serde(default = "default_top_terms")]
    pub top_terms_per_category: usize,

    /// Bridge command (e.g. `bun`).
    #[serde(default = "default_bridge_cmd")]
    pub bridge_cmd: String,

    #[serde(default = "default_bridge_script")]
    pub bridge_script: String,
}

impl Default for SummarySection {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            system_prompt: default_system_prompt(),
            top_terms_per_category: default_top_terms(),
            bridge_cmd: default_bridge_cmd(),
            bridge_script: default_bridge_script(),
        }
    }
}

fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_max_output_tokens() -> u32 {
    2000
}
fn default_system_prompt() -> String {
    "You are a labour-market analyst. Summarize the most common requirements \
     in these job postings for a job seeker, grouped by category."
        .into()
}
fn default_top_terms() -> usize {
    10
}
fn default_bridge_cmd() -> String {
    "bun".into()
}
fn default_bridge_script() -> String {
    "bridge/summarize.ts".into()
}

/// Which context policy assigns weight classes to matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicyKind {
    /// Bulleted blocks classified by their heading.
    #[default]
    Section,
    /// Cue words in a window around the match.
    KeywordWindow,
}

/// How multiple matches of one term in one posting combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAggregation {
    /// Every surviving match adds its weight.
    #[default]
    Sum,
    /// Only the strongest match counts.
    Strongest,
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Backoff strategy between fetch retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `base * 2^(retry - 1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// Retry budget and delays for a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: Duration::from_millis(default_backoff_base_ms()),
            max_delay: Duration::from_millis(default_backoff_max_ms()),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// A policy with fixed delays.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// A policy with capped exponential backoff.
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-indexed). Zero for `retry == 0`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry - 1);
                self.base_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Run config (runtime, validated)
// ---------------------------------------------------------------------------

/// Fetch-stage settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub worker_count: usize,
    pub per_call_timeout: Duration,
    pub retry: RetryPolicy,
    pub max_details: Option<usize>,
    pub run_deadline: Option<Duration>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            worker_count: default_workers(),
            per_call_timeout: Duration::from_millis(default_per_call_timeout_ms()),
            retry: RetryPolicy::default(),
            max_details: None,
            run_deadline: None,
        }
    }
}

/// Dedupe-stage settings.
#[derive(Debug, Clone)]
pub struct DedupeSettings {
    pub description_prefix_chars: usize,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        Self {
            description_prefix_chars: default_description_prefix_chars(),
        }
    }
}

/// Analysis-stage settings. Part of the analysis cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub context_policy: ContextPolicyKind,
    pub aggregation: MatchAggregation,
    pub negative_window_chars: usize,
    pub gate_window_chars: usize,
    pub use_summary_fallback: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            context_policy: ContextPolicyKind::default(),
            aggregation: MatchAggregation::default(),
            negative_window_chars: default_negative_window_chars(),
            gate_window_chars: default_gate_window_chars(),
            use_summary_fallback: false,
        }
    }
}

/// Summary generation settings. Part of the summary cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub system_prompt: String,
    pub top_terms_per_category: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self::from(&SummarySection::default())
    }
}

impl From<&SummarySection> for SummaryConfig {
    fn from(section: &SummarySection) -> Self {
        Self {
            model: section.model.clone(),
            max_output_tokens: section.max_output_tokens,
            system_prompt: section.system_prompt.clone(),
            top_terms_per_category: section.top_terms_per_category,
        }
    }
}

/// Every option one pipeline run recognizes. Passed by value; never global.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub fetch: FetchSettings,
    pub dedupe: DedupeSettings,
    pub analysis: AnalysisSettings,
    pub dedupe_before_details: bool,
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Build and validate a run config from the user config file.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let fetch = &config.fetch;
        let retry = RetryPolicy {
            max_retries: fetch.max_retries,
            base_delay: Duration::from_millis(fetch.backoff_base_ms),
            max_delay: Duration::from_millis(fetch.backoff_max_ms),
            strategy: fetch.backoff,
        };

        let run = Self {
            fetch: FetchSettings {
                worker_count: fetch.workers,
                per_call_timeout: Duration::from_millis(fetch.per_call_timeout_ms),
                retry,
                max_details: fetch.max_details,
                run_deadline: fetch.run_deadline_secs.map(Duration::from_secs),
            },
            dedupe: DedupeSettings {
                description_prefix_chars: config.pipeline.description_prefix_chars,
            },
            analysis: AnalysisSettings {
                context_policy: config.analysis.context_policy,
                aggregation: config.analysis.aggregation,
                negative_window_chars: config.analysis.negative_window_chars,
                gate_window_chars: config.analysis.gate_window_chars,
                use_summary_fallback: config.analysis.use_summary_fallback,
            },
            dedupe_before_details: config.pipeline.dedupe_before_details,
            output_dir: config.pipeline.output_dir.as_deref().map(expand_home),
        };
        run.validate()?;
        Ok(run)
    }

    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        let fetch = &self.fetch;
        if fetch.worker_count == 0 || fetch.worker_count > MAX_WORKERS {
            return Err(JobSignalError::config(format!(
                "worker_count must be between 1 and {MAX_WORKERS}, got {}",
                fetch.worker_count
            )));
        }
        if fetch.per_call_timeout.is_zero() {
            return Err(JobSignalError::config("per_call_timeout must be positive"));
        }
        if fetch.retry.max_retries > MAX_RETRIES {
            return Err(JobSignalError::config(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                fetch.retry.max_retries
            )));
        }
        if fetch.retry.base_delay > fetch.retry.max_delay {
            return Err(JobSignalError::config(
                "backoff base delay exceeds backoff max delay",
            ));
        }
        if fetch.run_deadline.is_some_and(|d| d.is_zero()) {
            return Err(JobSignalError::config("run_deadline must be positive"));
        }
        if self.dedupe.description_prefix_chars == 0 {
            return Err(JobSignalError::config(
                "description_prefix_chars must be positive",
            ));
        }
        if self.analysis.negative_window_chars == 0 || self.analysis.gate_window_chars == 0 {
            return Err(JobSignalError::config("analysis windows must be positive"));
        }
        Ok(())
    }
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobsignal/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobSignalError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobsignal/jobsignal.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobSignalError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| JobSignalError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobSignalError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobSignalError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobSignalError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
