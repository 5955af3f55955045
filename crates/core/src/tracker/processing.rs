//! Drives an asset's state machine from the transcode job's reported status.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::asset::{AssetError, AssetStore, AssetUpdate, ProcessingState, VideoAsset};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::transcode::{JobStatus, TranscodeService};

use super::types::{AssetUpdateCallback, PollOutcome, TrackerError, PROCESSING_TIMEOUT_REASON};

/// Polls the transcode job for an asset and applies forward transitions.
///
/// Every write is a compare-and-set against the state read at the start of
/// the call, so a periodic tick and a manual refresh racing on the same asset
/// cannot lose or reorder an update.
pub struct ProcessingTracker {
    assets: Arc<dyn AssetStore>,
    transcoder: Arc<dyn TranscodeService>,
    audit: Option<AuditHandle>,
    on_update: Option<AssetUpdateCallback>,
}

impl ProcessingTracker {
    pub fn new(assets: Arc<dyn AssetStore>, transcoder: Arc<dyn TranscodeService>) -> Self {
        Self {
            assets,
            transcoder,
            audit: None,
            on_update: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_update_callback(mut self, callback: AssetUpdateCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    fn load(&self, asset_id: &str) -> Result<VideoAsset, TrackerError> {
        self.assets
            .get(asset_id)?
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()).into())
    }

    /// Query the job and apply whatever transition its status implies.
    ///
    /// `Processing` is written only when the asset is still `Pending`. A
    /// completed job has its artifacts fetched and written together with the
    /// `Completed` state. Lookup errors leave the asset unchanged.
    pub async fn poll(&self, asset_id: &str) -> Result<PollOutcome, TrackerError> {
        let asset = self.load(asset_id)?;
        if asset.is_terminal() {
            return Ok(PollOutcome::unchanged(asset));
        }

        let update = match self.next_update(&asset).await {
            Ok(update) => update,
            Err(outcome) => return Ok(outcome),
        };

        match update {
            Some(update) => self.apply(asset, update),
            None => {
                metrics::POLLS_TOTAL.with_label_values(&["unchanged"]).inc();
                Ok(PollOutcome::unchanged(asset))
            }
        }
    }

    /// Read current status, persisting only a move into a terminal state.
    ///
    /// A job reporting progress for a `Pending` asset is not written here; the
    /// returned data is the stored record, possibly stale.
    pub async fn refresh(&self, asset_id: &str) -> Result<PollOutcome, TrackerError> {
        let asset = self.load(asset_id)?;
        if asset.is_terminal() {
            return Ok(PollOutcome::unchanged(asset));
        }

        match self.next_update(&asset).await {
            Ok(Some(update)) if update.state.is_some_and(|s| s.is_terminal()) => {
                self.apply(asset, update)
            }
            Ok(_) => Ok(PollOutcome::unchanged(asset)),
            Err(outcome) => Ok(outcome),
        }
    }

    /// Fail a non-terminal asset with the processing-timeout reason.
    pub async fn force_timeout(&self, asset_id: &str) -> Result<PollOutcome, TrackerError> {
        let asset = self.load(asset_id)?;
        if asset.is_terminal() {
            return Ok(PollOutcome::unchanged(asset));
        }

        let outcome = self.apply(asset, AssetUpdate::failed(PROCESSING_TIMEOUT_REASON))?;
        if outcome.transitioned {
            metrics::PROCESSING_TIMEOUTS.inc();
            warn!(asset_id = %asset_id, "Asset exceeded processing ceiling");
        }
        Ok(outcome)
    }

    /// Maps the job's status onto an update for `asset`, if one is due.
    ///
    /// The `Err` side carries an unchanged outcome for a failed lookup.
    async fn next_update(&self, asset: &VideoAsset) -> Result<Option<AssetUpdate>, PollOutcome> {
        let status = match self.transcoder.status(&asset.id).await {
            Ok(status) => status,
            Err(e) => return Err(self.lookup_failed(asset, e)),
        };
        debug!(asset_id = %asset.id, status = status.as_str(), "Transcode job status");

        let update = match status {
            JobStatus::Pending => None,
            JobStatus::Processing => {
                (asset.state == ProcessingState::Pending).then(AssetUpdate::processing)
            }
            JobStatus::Completed => match self.transcoder.result(&asset.id).await {
                Ok(output) => Some(AssetUpdate::completed(output)),
                Err(e) => return Err(self.lookup_failed(asset, e)),
            },
            JobStatus::Failed { reason } => {
                let reason = if reason.trim().is_empty() {
                    "transcode job failed".to_string()
                } else {
                    reason
                };
                Some(AssetUpdate::failed(reason))
            }
        };

        Ok(update)
    }

    fn lookup_failed(
        &self,
        asset: &VideoAsset,
        error: crate::transcode::TranscodeError,
    ) -> PollOutcome {
        metrics::POLLS_TOTAL.with_label_values(&["lookup_error"]).inc();
        warn!(asset_id = %asset.id, "Transcode status lookup failed, will retry: {}", error);
        PollOutcome::lookup_failed(asset.clone(), &error)
    }

    /// Compare-and-set `update` against the state `current` was read in.
    fn apply(&self, current: VideoAsset, update: AssetUpdate) -> Result<PollOutcome, TrackerError> {
        let from = current.state;

        match self.assets.transition(&current.id, from, update) {
            Ok(asset) => {
                metrics::POLLS_TOTAL.with_label_values(&["transitioned"]).inc();
                metrics::STATE_TRANSITIONS
                    .with_label_values(&[asset.state.as_str()])
                    .inc();
                info!(
                    asset_id = %asset.id,
                    from = from.as_str(),
                    to = asset.state.as_str(),
                    "Asset state changed"
                );

                if let Some(ref audit) = self.audit {
                    audit.try_emit(AuditEvent::AssetStateChanged {
                        asset_id: asset.id.clone(),
                        from_state: from.to_string(),
                        to_state: asset.state.to_string(),
                        reason: asset.failure_reason.clone(),
                    });
                }
                if let Some(ref callback) = self.on_update {
                    callback(&asset);
                }

                Ok(PollOutcome::transitioned(asset))
            }
            Err(AssetError::StateConflict { .. }) | Err(AssetError::InvalidTransition { .. }) => {
                // Another writer moved the asset first; report what it wrote.
                metrics::POLLS_TOTAL.with_label_values(&["conflict"]).inc();
                debug!(asset_id = %current.id, "Lost state race, re-reading asset");
                Ok(PollOutcome::unchanged(self.load(&current.id)?))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::asset::{CreateAssetRequest, Quality, SqliteAssetStore};
    use crate::testing::MockTranscodeService;
    use crate::transcode::{TranscodeError, TranscodeOutput};

    fn setup() -> (Arc<SqliteAssetStore>, Arc<MockTranscodeService>, ProcessingTracker) {
        let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
        assets
            .create(CreateAssetRequest {
                id: "asset-1".to_string(),
                owner_id: "coach".to_string(),
                game_id: "game-1".to_string(),
                raw_location: "raw/game-1/asset-1/film.mp4".to_string(),
                size_bytes: 10,
            })
            .unwrap();
        let transcoder = Arc::new(MockTranscodeService::new());
        let tracker = ProcessingTracker::new(assets.clone(), transcoder.clone());
        (assets, transcoder, tracker)
    }

    fn output() -> TranscodeOutput {
        let mut variants = BTreeMap::new();
        variants.insert(Quality::P1080, "variants/asset-1/1080p.mp4".to_string());
        variants.insert(Quality::P720, "variants/asset-1/720p.mp4".to_string());
        TranscodeOutput {
            variants,
            thumbnails: (0..5).map(|i| format!("thumbs/asset-1/{}.jpg", i)).collect(),
            duration_secs: Some(3600.0),
        }
    }

    #[tokio::test]
    async fn test_poll_moves_pending_to_processing() {
        let (assets, transcoder, tracker) = setup();
        transcoder.set_status("asset-1", JobStatus::Processing).await;

        let outcome = tracker.poll("asset-1").await.unwrap();
        assert!(outcome.transitioned);
        assert_eq!(outcome.state(), ProcessingState::Processing);

        // Reporting progress again is not a new transition.
        let outcome = tracker.poll("asset-1").await.unwrap();
        assert!(!outcome.transitioned);
        assert_eq!(
            assets.get("asset-1").unwrap().unwrap().state,
            ProcessingState::Processing
        );
    }

    #[tokio::test]
    async fn test_lookup_error_leaves_state_unchanged() {
        let (assets, transcoder, tracker) = setup();
        transcoder
            .set_next_error(TranscodeError::Unreachable("connection refused".to_string()))
            .await;

        let outcome = tracker.poll("asset-1").await.unwrap();
        assert!(!outcome.transitioned);
        assert!(outcome.lookup_error.is_some());
        assert_eq!(
            assets.get("asset-1").unwrap().unwrap().state,
            ProcessingState::Pending
        );
    }

    #[tokio::test]
    async fn test_failed_job_records_reason() {
        let (_assets, transcoder, tracker) = setup();
        transcoder
            .set_status(
                "asset-1",
                JobStatus::Failed {
                    reason: "unsupported codec".to_string(),
                },
            )
            .await;

        let outcome = tracker.poll("asset-1").await.unwrap();
        assert_eq!(outcome.state(), ProcessingState::Failed);
        assert_eq!(
            outcome.asset.failure_reason.as_deref(),
            Some("unsupported codec")
        );
    }

    #[tokio::test]
    async fn test_refresh_does_not_write_progress() {
        let (assets, transcoder, tracker) = setup();
        transcoder.set_status("asset-1", JobStatus::Processing).await;

        let outcome = tracker.refresh("asset-1").await.unwrap();
        assert!(!outcome.transitioned);
        assert_eq!(outcome.state(), ProcessingState::Pending);
        assert_eq!(
            assets.get("asset-1").unwrap().unwrap().state,
            ProcessingState::Pending
        );
    }

    #[tokio::test]
    async fn test_refresh_writes_completion() {
        let (_assets, transcoder, tracker) = setup();
        transcoder.complete("asset-1", output()).await;

        let outcome = tracker.refresh("asset-1").await.unwrap();
        assert!(outcome.transitioned);
        assert_eq!(outcome.asset.thumbnails.len(), 5);
    }

    #[tokio::test]
    async fn test_terminal_asset_is_not_queried() {
        let (_assets, transcoder, tracker) = setup();
        transcoder.complete("asset-1", output()).await;
        tracker.poll("asset-1").await.unwrap();
        let calls = transcoder.status_calls("asset-1").await;

        tracker.poll("asset-1").await.unwrap();
        tracker.refresh("asset-1").await.unwrap();
        assert_eq!(transcoder.status_calls("asset-1").await, calls);
    }

    #[tokio::test]
    async fn test_force_timeout() {
        let (_assets, _transcoder, tracker) = setup();

        let outcome = tracker.force_timeout("asset-1").await.unwrap();
        assert!(outcome.transitioned);
        assert_eq!(outcome.state(), ProcessingState::Failed);
        assert_eq!(
            outcome.asset.failure_reason.as_deref(),
            Some(PROCESSING_TIMEOUT_REASON)
        );

        // Idempotent once terminal.
        let again = tracker.force_timeout("asset-1").await.unwrap();
        assert!(!again.transitioned);
    }

    #[tokio::test]
    async fn test_stale_writer_loses_race_without_regressing() {
        let (assets, transcoder, tracker) = setup();
        // A concurrent writer completes the asset first.
        assets.update("asset-1", AssetUpdate::completed(output())).unwrap();
        transcoder.set_status("asset-1", JobStatus::Processing).await;

        let stale = VideoAsset {
            state: ProcessingState::Pending,
            variants: BTreeMap::new(),
            thumbnails: vec![],
            ..assets.get("asset-1").unwrap().unwrap()
        };
        let outcome = tracker.apply(stale, AssetUpdate::processing()).unwrap();

        assert!(!outcome.transitioned);
        assert_eq!(outcome.state(), ProcessingState::Completed);
    }

    #[tokio::test]
    async fn test_update_callback_sees_each_transition() {
        let (_assets, transcoder, tracker) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = tracker.with_update_callback(Arc::new(move |asset: &VideoAsset| {
            sink.lock().unwrap().push(asset.state);
        }));

        transcoder.set_status("asset-1", JobStatus::Processing).await;
        tracker.poll("asset-1").await.unwrap();
        transcoder.complete("asset-1", output()).await;
        tracker.poll("asset-1").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProcessingState::Processing, ProcessingState::Completed]
        );
    }

    #[tokio::test]
    async fn test_unknown_asset() {
        let (_assets, _transcoder, tracker) = setup();
        let err = tracker.poll("missing").await.unwrap_err();
        assert!(matches!(err, TrackerError::Asset(AssetError::NotFound(_))));
    }
}
