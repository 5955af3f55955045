//! Error types for the transcode module.

use thiserror::Error;

/// Errors that can occur talking to the transcode job service.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Transcode service unreachable: {0}")]
    Unreachable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid response from transcode service: {0}")]
    InvalidResponse(String),

    #[error("Transcode service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for TranscodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscodeError::Timeout
        } else if e.is_connect() {
            TranscodeError::Unreachable(e.to_string())
        } else if e.is_decode() {
            TranscodeError::InvalidResponse(e.to_string())
        } else {
            TranscodeError::Api {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            }
        }
    }
}
