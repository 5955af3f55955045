//! Error types for blob transfers.

use thiserror::Error;

/// Errors that can occur while talking to blob storage.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Key is empty, malformed, or escapes the store root.
    #[error("Invalid blob key: {key}")]
    InvalidKey { key: String },

    /// No blob stored under the key.
    #[error("Blob not found: {key}")]
    NotFound { key: String },

    /// The source stream failed mid-transfer.
    #[error("Transfer interrupted: {reason}")]
    Interrupted { reason: String },

    /// A single attempt exceeded its I/O deadline.
    #[error("Transfer timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error in the storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure; not retried.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl BlobError {
    /// Creates an interrupted-transfer error.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Whether this error is a transient I/O condition worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Interrupted { .. } | Self::Timeout { .. } | Self::Io(_)
        )
    }
}
