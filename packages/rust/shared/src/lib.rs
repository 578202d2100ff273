//! Shared types, error model, and configuration for jobsignal.
//!
//! This crate is the foundation depended on by all other jobsignal crates.
//! It provides:
//! - [`JobSignalError`], the unified error type
//! - Domain types ([`Posting`], [`Fingerprint`], [`AnalysisReport`], [`WeightClass`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisSection, AnalysisSettings, AppConfig, BackoffStrategy, ContextPolicyKind,
    DedupeSettings, FetchSection, FetchSettings, MatchAggregation, PipelineSection, RetryPolicy,
    RunConfig, SummaryConfig, SummarySection, config_dir, config_file_path,
    default_detail_selectors, expand_home, init_config, load_config, load_config_from,
};
pub use error::{JobSignalError, Result};
pub use types::{
    AnalysisReport, CacheStatus, CategoryScore, DetailStatus, Fingerprint, InputFingerprint,
    Posting, PostingRef, ReportMeta, RunId, TermScore, WeightClass, sha256_hex,
};
