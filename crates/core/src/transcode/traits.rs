//! Trait definitions for the transcode module.

use async_trait::async_trait;

use super::error::TranscodeError;
use super::types::{JobStatus, TranscodeOutput};

/// External service that turns a raw upload into playback variants and thumbnails.
#[async_trait]
pub trait TranscodeService: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Submits a job for `asset_id` reading from `source_location`.
    async fn submit(&self, asset_id: &str, source_location: &str) -> Result<(), TranscodeError>;

    /// Current status of the job for `asset_id`.
    async fn status(&self, asset_id: &str) -> Result<JobStatus, TranscodeError>;

    /// Artifacts of a completed job.
    async fn result(&self, asset_id: &str) -> Result<TranscodeOutput, TranscodeError>;
}
