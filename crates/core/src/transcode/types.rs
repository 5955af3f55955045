//! Transcode job types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::asset::Quality;

/// Status reported by the transcode job service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted but not started.
    Pending,
    /// Transcoding in progress.
    Processing,
    /// Finished; results can be fetched.
    Completed,
    /// Finished unsuccessfully.
    Failed {
        #[serde(default)]
        reason: String,
    },
}

impl JobStatus {
    /// Returns the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Request body for submitting a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub asset_id: String,
    pub source_location: String,
}

/// Artifacts produced by a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscodeOutput {
    /// Playback variants keyed by quality.
    #[serde(default)]
    pub variants: BTreeMap<Quality, String>,
    /// Thumbnail locations in presentation order.
    #[serde(default)]
    pub thumbnails: Vec<String>,
    /// Duration of the source footage, when the job probed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}
