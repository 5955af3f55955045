//! Types for the processing status tracker.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::asset::{AssetError, ProcessingState, VideoAsset};
use crate::transcode::TranscodeError;

/// Failure reason recorded when an asset exceeds the processing ceiling.
pub const PROCESSING_TIMEOUT_REASON: &str = "processing timeout";

/// Errors surfaced by the tracker.
///
/// Transcode lookup errors are not in here: a failed status lookup leaves the
/// asset untouched and is reported through [`PollOutcome::lookup_error`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("asset registry error: {0}")]
    Asset(#[from] AssetError),
}

/// Result of one poll or refresh.
#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    /// The asset as it stands after this call.
    pub asset: VideoAsset,
    /// Whether this call wrote a state transition.
    pub transitioned: bool,
    /// Set when the job status could not be looked up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_error: Option<String>,
}

impl PollOutcome {
    pub(crate) fn unchanged(asset: VideoAsset) -> Self {
        Self {
            asset,
            transitioned: false,
            lookup_error: None,
        }
    }

    pub(crate) fn lookup_failed(asset: VideoAsset, error: &TranscodeError) -> Self {
        Self {
            asset,
            transitioned: false,
            lookup_error: Some(error.to_string()),
        }
    }

    pub(crate) fn transitioned(asset: VideoAsset) -> Self {
        Self {
            asset,
            transitioned: true,
            lookup_error: None,
        }
    }

    /// Current processing state.
    pub fn state(&self) -> ProcessingState {
        self.asset.state
    }

    /// Whether the asset reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.asset.is_terminal()
    }
}

/// Invoked after every committed state transition.
pub type AssetUpdateCallback = Arc<dyn Fn(&VideoAsset) + Send + Sync>;
