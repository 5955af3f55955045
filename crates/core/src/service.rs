//! Game-level operations over the upload, registry, and tracking components.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::asset::{AssetError, AssetStore, ProcessingState, Quality, VideoAsset};
use crate::blob::{BlobError, BlobStore};
use crate::tracker::{PollSupervisor, TrackerError, PROCESSING_TIMEOUT_REASON};
use crate::upload::{
    ByteSource, ProgressCallback, UploadCoordinator, UploadError, UploadRequest,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The game has no uploaded footage.
    #[error("No video uploaded for game {0}")]
    NoVideo(String),

    /// The transcode job reported a terminal failure.
    #[error("Processing failed for asset {asset_id}: {reason}")]
    ProcessingFailed { asset_id: String, reason: String },

    /// Processing exceeded its time ceiling.
    #[error("Processing timed out for asset {asset_id}")]
    ProcessingTimeout { asset_id: String },

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Storage error: {0}")]
    Storage(#[from] BlobError),
}

/// Result of `upload_video`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedVideo {
    pub asset_id: String,
    /// Best available playback location, if any variant exists yet.
    pub variant_location: Option<String>,
}

/// Playable sources for a game's footage.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSources {
    pub asset_id: String,
    pub state: ProcessingState,
    /// Quality label to a time-limited URL.
    pub variants: BTreeMap<Quality, String>,
    pub thumbnails: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Processing state of a game's latest upload.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatus {
    pub asset_id: String,
    pub game_id: String,
    pub state: ProcessingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ProcessingStatus {
    fn from_asset(asset: &VideoAsset) -> Self {
        Self {
            asset_id: asset.id.clone(),
            game_id: asset.game_id.clone(),
            state: asset.state,
            failure_reason: asset.failure_reason.clone(),
        }
    }

    /// The terminal failure as an error, if processing failed or timed out.
    pub fn failure(&self) -> Option<ServiceError> {
        if self.state != ProcessingState::Failed {
            return None;
        }
        let reason = self.failure_reason.clone().unwrap_or_default();
        if reason == PROCESSING_TIMEOUT_REASON {
            Some(ServiceError::ProcessingTimeout {
                asset_id: self.asset_id.clone(),
            })
        } else {
            Some(ServiceError::ProcessingFailed {
                asset_id: self.asset_id.clone(),
                reason,
            })
        }
    }
}

/// Preferred variant for playback when only one location is wanted.
const PLAYBACK_PREFERENCE: [Quality; 3] = [Quality::P1080, Quality::P720, Quality::Original];

/// Coach-facing video operations keyed by game.
pub struct GameFilmService {
    coordinator: Arc<UploadCoordinator>,
    supervisor: Arc<PollSupervisor>,
    assets: Arc<dyn AssetStore>,
    blobs: Arc<dyn BlobStore>,
}

impl GameFilmService {
    pub fn new(
        coordinator: Arc<UploadCoordinator>,
        supervisor: Arc<PollSupervisor>,
        assets: Arc<dyn AssetStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            assets,
            blobs,
        }
    }

    pub fn coordinator(&self) -> &Arc<UploadCoordinator> {
        &self.coordinator
    }

    /// Upload footage for a game and wait for the transfer to finish.
    pub async fn upload_video(
        &self,
        request: UploadRequest,
        source: Box<dyn ByteSource>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadedVideo, ServiceError> {
        let outcome = self.coordinator.upload(request, source, on_progress).await?;
        Ok(UploadedVideo {
            variant_location: preferred_variant(&outcome.asset),
            asset_id: outcome.asset.id,
        })
    }

    /// Cancel the game's in-flight upload.
    pub fn cancel_upload(&self, game_id: &str) -> bool {
        self.coordinator.cancel(game_id)
    }

    /// Signed playback URLs and thumbnails for the game's latest upload.
    pub async fn get_video_sources(&self, game_id: &str) -> Result<VideoSources, ServiceError> {
        let asset = self.latest(game_id)?;

        let mut variants = BTreeMap::new();
        for (quality, location) in &asset.variants {
            if let Some(url) = self.playable_url(location).await? {
                variants.insert(*quality, url);
            }
        }

        let mut thumbnails = Vec::with_capacity(asset.thumbnails.len());
        for location in &asset.thumbnails {
            if let Some(url) = self.playable_url(location).await? {
                thumbnails.push(url);
            }
        }

        Ok(VideoSources {
            asset_id: asset.id,
            state: asset.state,
            variants,
            thumbnails,
            failure_reason: asset.failure_reason,
        })
    }

    /// Current processing state of the game's latest upload.
    ///
    /// An unfinished asset is refreshed against the transcode job and put
    /// under polling if it is not already.
    pub async fn check_processing_status(
        &self,
        game_id: &str,
    ) -> Result<ProcessingStatus, ServiceError> {
        let asset = self.latest(game_id)?;
        if asset.is_terminal() {
            return Ok(ProcessingStatus::from_asset(&asset));
        }

        if self.supervisor.watch(&asset.id).await? {
            debug!(asset_id = %asset.id, "Started polling on status request");
        }
        let outcome = self.supervisor.tracker().refresh(&asset.id).await?;
        Ok(ProcessingStatus::from_asset(&outcome.asset))
    }

    fn latest(&self, game_id: &str) -> Result<VideoAsset, ServiceError> {
        self.assets
            .latest_for_game(game_id)?
            .ok_or_else(|| ServiceError::NoVideo(game_id.to_string()))
    }

    /// Absolute URLs pass through; blob keys are signed. Missing blobs are skipped.
    async fn playable_url(&self, location: &str) -> Result<Option<String>, ServiceError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(Some(location.to_string()));
        }
        match self.blobs.signed_url(location).await {
            Ok(signed) => Ok(Some(signed.url)),
            Err(BlobError::NotFound { key }) => {
                warn!(key = %key, "Artifact missing from storage, omitting");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn preferred_variant(asset: &VideoAsset) -> Option<String> {
    PLAYBACK_PREFERENCE
        .iter()
        .find_map(|quality| asset.variants.get(quality).cloned())
}
