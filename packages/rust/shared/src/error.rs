//! Error types for jobsignal.
//!
//! Library crates use [`JobSignalError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all jobsignal operations.
#[derive(Debug, thiserror::Error)]
pub enum JobSignalError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of the per-posting fetch path.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored cache entry could not be read back.
    #[error("corrupt cache entry {key}: {message}")]
    CacheCorrupt { key: String, message: String },

    /// Text generation error (bridge, model, or response parsing).
    #[error("generation error: {0}")]
    Generation(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobSignalError>;

impl JobSignalError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a cache-corruption error for the given store key.
    pub fn cache_corrupt(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for configuration errors, the only kind surfaced before a run starts.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
