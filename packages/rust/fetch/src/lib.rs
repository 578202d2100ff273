//! Bounded-concurrency detail fetching for jobsignal.
//!
//! - [`Fetcher`]: the detail-retrieval capability (HTTP implementation in [`http`])
//! - [`fetch_all`]: worker pool with per-call timeout, retries and ordered results

pub mod engine;
pub mod fetcher;
pub mod http;

pub use engine::{
    FetchBatch, FetchProgress, FetchResult, FetchStats, FetchStatus, SilentFetchProgress,
    SkipReason, fetch_all,
};
pub use fetcher::{CancelFlag, FetchError, Fetcher};
pub use http::{HttpFetcher, extract_detail};
