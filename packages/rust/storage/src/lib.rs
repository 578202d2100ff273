//! Cached derived artifacts for jobsignal.
//!
//! Analysis reports and generated summaries are stored under a [`StoreKey`]
//! together with the [`InputFingerprint`](jobsignal_shared::InputFingerprint)
//! of the input they were derived from. [`resolve`] compares that against the
//! current input and yields `current`, `outdated` or `absent`.
//!
//! Two stores implement [`ReportStore`]:
//! - [`FsReportStore`]: one JSON file per key, atomic replace on write
//! - [`SqlReportStore`]: local libSQL database with run history

pub mod entry;
pub mod fs;
mod migrations;
pub mod sql;

use std::future::Future;

use jobsignal_shared::Result;

pub use entry::{
    Artifact, CACHE_SCHEMA_VERSION, CacheEntry, GenerationParams, Resolution, StoreKey,
    compute_input_fingerprint, resolve,
};
pub use fs::FsReportStore;
pub use sql::{RunRecord, SqlReportStore};

/// Keyed persistence for [`CacheEntry`] values.
///
/// Implementations report unreadable entries as `Ok(None)` and reserve
/// `Err` for the store itself being unusable.
pub trait ReportStore: Send + Sync {
    fn load(&self, key: &StoreKey) -> impl Future<Output = Result<Option<CacheEntry>>> + Send;

    fn save(&self, key: &StoreKey, entry: &CacheEntry) -> impl Future<Output = Result<()>> + Send;
}
