//! The detail-retrieval capability and its failure taxonomy.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jobsignal_shared::PostingRef;

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The call did not complete within the per-call timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The remote refused service (rate limit, bot wall, forbidden target).
    #[error("blocked: {0}")]
    Blocked(String),

    /// The posting or its description no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection, protocol or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// `NotFound` is terminal; everything else goes through the retry policy.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Blocked(_) => "blocked",
            Self::NotFound(_) => "not_found",
            Self::Transport(_) => "transport",
        }
    }
}

/// Retrieves the full detail text for one posting reference.
///
/// Implementations may block for a long time; the orchestrator wraps every
/// call in its own timeout, so `timeout` is advisory for implementations that
/// can push it down to their transport.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        reference: &PostingRef,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Cooperative cancellation shared between the caller and fetch workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask workers to stop taking new references.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
