//! Transcode job service abstraction.
//!
//! The actual transformation of footage into playback variants and
//! thumbnails happens in an external job service. This module provides the
//! `TranscodeService` trait the core talks to and an HTTP client for it.

mod disabled;
mod error;
mod http;
mod traits;
mod types;

pub use disabled::DisabledTranscodeService;
pub use error::TranscodeError;
pub use http::HttpTranscodeClient;
pub use traits::TranscodeService;
pub use types::{JobStatus, SubmitJobRequest, TranscodeOutput};
