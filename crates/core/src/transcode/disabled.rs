//! Stand-in used when no transcode job service is configured.

use async_trait::async_trait;

use super::{JobStatus, TranscodeError, TranscodeOutput, TranscodeService};

/// Rejects every call. Uploads still register their assets, which stay
/// `Pending` until the processing ceiling fails them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTranscodeService;

impl DisabledTranscodeService {
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> TranscodeError {
        TranscodeError::Unreachable("no transcode service configured".to_string())
    }
}

#[async_trait]
impl TranscodeService for DisabledTranscodeService {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn submit(&self, _asset_id: &str, _source_location: &str) -> Result<(), TranscodeError> {
        Err(Self::unavailable())
    }

    async fn status(&self, _asset_id: &str) -> Result<JobStatus, TranscodeError> {
        Err(Self::unavailable())
    }

    async fn result(&self, _asset_id: &str) -> Result<TranscodeOutput, TranscodeError> {
        Err(Self::unavailable())
    }
}
