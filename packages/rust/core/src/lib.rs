//! Pipeline orchestration for jobsignal.
//!
//! Ties detail fetching, deduplication, requirements analysis and cached
//! summaries into a single run ([`run_pipeline`]), and persists the run
//! layout when an output directory is configured.

pub mod bridge;
pub mod layout;
pub mod pipeline;
pub mod summary;

pub use bridge::{BridgeConfig, BridgeGenerator};
pub use layout::{RunLayout, posting_slug, write_run_layout};
pub use pipeline::{
    PipelineRun, ProgressReporter, REPORT_ARTIFACT, RunRequest, RunStats, SilentProgress,
    run_pipeline,
};
pub use summary::{
    GenerationRequest, NoSummary, SUMMARY_ARTIFACT, SummaryInput, SummaryOutcome, TextGenerator,
    build_summary_input, summarize,
};
