//! Error types for the memory engine.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Error taxonomy for the memory engine.
///
/// Every variant corresponds to one of the error classes a caller needs to
/// branch on: validation failures are never retried, store failures may be
/// retried for idempotent reads, and `Parse` failures are always recovered
/// locally rather than surfaced (see [`crate::provider`]).
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid transition {from} -> {to}{suggestion}")]
    InvalidTransition {
        from: String,
        to: String,
        suggestion: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("model response could not be parsed: {0}")]
    Parse(String),

    #[error("maintenance already in progress")]
    OptimizationBusy,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// Whether this error class may be retried for an idempotent read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::Store(_) | MemoryError::Timeout(_))
    }

    pub fn invalid_transition(
        from: impl Into<String>,
        to: impl Into<String>,
        suggested: Option<String>,
    ) -> Self {
        let suggestion = suggested
            .map(|s| format!(" (suggested: {s})"))
            .unwrap_or_default();
        MemoryError::InvalidTransition {
            from: from.into(),
            to: to.into(),
            suggestion,
        }
    }
}
