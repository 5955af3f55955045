//! Upload coordinator.
//!
//! Streams raw footage into blob storage, registers the asset once the bytes
//! are durable, and kicks off transcoding:
//! - At most one upload per game is in flight; a second one is a conflict.
//! - Transient transfer errors are retried with exponential backoff, each
//!   attempt restarting the byte source from the beginning.
//! - A failed or cancelled upload deletes whatever reached storage and never
//!   creates an asset.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::asset::{AssetStore, CreateAssetRequest};
use crate::audit::{AuditEvent, AuditHandle};
use crate::blob::{BlobError, BlobLocation, BlobStore, ByteStream};
use crate::config::UploadConfig;
use crate::metrics;
use crate::tracker::PollSupervisor;
use crate::transcode::TranscodeService;

use super::progress::ProgressReporter;
use super::retry::RetryPolicy;
use super::types::{ByteSource, ProgressCallback, UploadError, UploadOutcome, UploadRequest};

type InFlightMap = Arc<Mutex<HashMap<String, InFlightUpload>>>;

/// Registry entry for a game's running upload.
struct InFlightUpload {
    cancel_tx: Arc<watch::Sender<bool>>,
    /// Set once the asset is about to be registered; cancellation is refused after that.
    committed: bool,
}

impl InFlightUpload {
    fn request_cancel(&self) -> bool {
        if self.committed {
            return false;
        }
        self.cancel_tx.send_replace(true);
        true
    }
}

/// Removes the game's in-flight entry when the upload task ends, however it ends.
struct GameReservation {
    game_id: String,
    in_flight: InFlightMap,
}

impl Drop for GameReservation {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.game_id);
    }
}

/// A running upload.
pub struct UploadHandle {
    game_id: String,
    asset_id: String,
    cancel_tx: Arc<watch::Sender<bool>>,
    in_flight: InFlightMap,
    task: JoinHandle<Result<UploadOutcome, UploadError>>,
}

impl UploadHandle {
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Id the asset will have if the upload succeeds.
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Abort the transfer. No asset is created.
    ///
    /// Returns false if the upload already finished or its asset is being
    /// registered.
    pub fn cancel(&self) -> bool {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match in_flight.get(&self.game_id) {
            Some(entry) if Arc::ptr_eq(&entry.cancel_tx, &self.cancel_tx) => entry.request_cancel(),
            _ => false,
        }
    }

    /// Wait for the upload to finish.
    pub async fn wait(self) -> Result<UploadOutcome, UploadError> {
        self.task
            .await
            .map_err(|e| UploadError::Aborted(e.to_string()))?
    }
}

/// Orchestrates blob transfer, asset registration, and transcode submission.
pub struct UploadCoordinator {
    blobs: Arc<dyn BlobStore>,
    assets: Arc<dyn AssetStore>,
    transcoder: Arc<dyn TranscodeService>,
    supervisor: Option<Arc<PollSupervisor>>,
    audit: Option<AuditHandle>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    in_flight: InFlightMap,
}

impl UploadCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        assets: Arc<dyn AssetStore>,
        transcoder: Arc<dyn TranscodeService>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            blobs,
            assets,
            transcoder,
            supervisor: None,
            audit: None,
            policy: RetryPolicy::from(config),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start polling each new asset as soon as it is registered.
    pub fn with_supervisor(mut self, supervisor: Arc<PollSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start an upload in the background.
    ///
    /// Fails immediately with [`UploadError::Conflict`] if the game already has
    /// an upload in flight; that upload is not affected.
    pub fn begin_upload(
        &self,
        request: UploadRequest,
        source: Box<dyn ByteSource>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadHandle, UploadError> {
        validate_request(&request)?;

        let cancel_tx = Arc::new(watch::channel(false).0);
        let reservation = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if in_flight.contains_key(&request.game_id) {
                metrics::UPLOADS_TOTAL.with_label_values(&["conflict"]).inc();
                warn!(game_id = %request.game_id, "Rejected concurrent upload");
                return Err(UploadError::Conflict {
                    game_id: request.game_id,
                });
            }
            in_flight.insert(
                request.game_id.clone(),
                InFlightUpload {
                    cancel_tx: Arc::clone(&cancel_tx),
                    committed: false,
                },
            );
            GameReservation {
                game_id: request.game_id.clone(),
                in_flight: Arc::clone(&self.in_flight),
            }
        };

        let asset_id = Uuid::new_v4().to_string();
        let cancel_rx = cancel_tx.subscribe();
        let job = UploadJob {
            blobs: Arc::clone(&self.blobs),
            assets: Arc::clone(&self.assets),
            transcoder: Arc::clone(&self.transcoder),
            supervisor: self.supervisor.clone(),
            audit: self.audit.clone(),
            policy: self.policy.clone(),
            attempt_timeout: self.attempt_timeout,
            in_flight: Arc::clone(&self.in_flight),
            key: request.raw_key(&asset_id),
            progress: ProgressReporter::new(request.size_hint, on_progress),
            asset_id: asset_id.clone(),
            request,
            source,
        };
        let game_id = job.request.game_id.clone();

        let task = tokio::spawn(async move {
            let _reservation = reservation;
            job.run(cancel_rx).await
        });

        Ok(UploadHandle {
            game_id,
            asset_id,
            cancel_tx,
            in_flight: Arc::clone(&self.in_flight),
            task,
        })
    }

    /// Run an upload to completion.
    pub async fn upload(
        &self,
        request: UploadRequest,
        source: Box<dyn ByteSource>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        self.begin_upload(request, source, on_progress)?.wait().await
    }

    /// Cancel the in-flight upload for a game.
    ///
    /// Returns false if there is none, or if its bytes are already committed
    /// and the asset is being registered.
    pub fn cancel(&self, game_id: &str) -> bool {
        let in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match in_flight.get(game_id) {
            Some(entry) if entry.request_cancel() => {
                info!(game_id = %game_id, "Upload cancellation requested");
                true
            }
            Some(_) => {
                debug!(game_id = %game_id, "Upload already committed, not cancelling");
                false
            }
            None => false,
        }
    }

    /// Games with an upload in flight, sorted.
    pub fn in_flight(&self) -> Vec<String> {
        let mut games: Vec<String> = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        games.sort();
        games
    }

    pub fn is_uploading(&self, game_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(game_id)
    }
}

fn validate_request(request: &UploadRequest) -> Result<(), UploadError> {
    if request.owner_id.trim().is_empty() {
        return Err(UploadError::InvalidRequest("owner id is required".to_string()));
    }
    let game_id_ok = request
        .game_id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && request
            .game_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !game_id_ok {
        return Err(UploadError::InvalidRequest(format!(
            "invalid game id: {:?}",
            request.game_id
        )));
    }
    Ok(())
}

/// State owned by one upload task.
struct UploadJob {
    blobs: Arc<dyn BlobStore>,
    assets: Arc<dyn AssetStore>,
    transcoder: Arc<dyn TranscodeService>,
    supervisor: Option<Arc<PollSupervisor>>,
    audit: Option<AuditHandle>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    in_flight: InFlightMap,
    request: UploadRequest,
    asset_id: String,
    key: String,
    source: Box<dyn ByteSource>,
    progress: ProgressReporter,
}

impl UploadJob {
    async fn run(mut self, mut cancel_rx: watch::Receiver<bool>) -> Result<UploadOutcome, UploadError> {
        let started = Instant::now();
        info!(
            game_id = %self.request.game_id,
            asset_id = %self.asset_id,
            size_hint = self.request.size_hint,
            "Upload started"
        );
        self.emit(AuditEvent::UploadStarted {
            game_id: self.request.game_id.clone(),
            asset_id: self.asset_id.clone(),
            owner_id: self.request.owner_id.clone(),
            size_hint: self.request.size_hint,
        })
        .await;

        let transfer = tokio::select! {
            biased;
            _ = wait_for_cancel(&mut cancel_rx) => Err(UploadError::Cancelled),
            result = self.transfer() => result,
        };

        let result = match transfer {
            Ok((location, attempts)) => match self.commit(&cancel_rx) {
                Ok(()) => self.register(location, attempts, started).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            self.discard(e, started).await;
        }
        result
    }

    /// Close the cancellation window. Checked under the registry lock so a
    /// concurrent `cancel` either lands before this or is refused.
    fn commit(&self, cancel_rx: &watch::Receiver<bool>) -> Result<(), UploadError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *cancel_rx.borrow() {
            return Err(UploadError::Cancelled);
        }
        if let Some(entry) = in_flight.get_mut(&self.request.game_id) {
            entry.committed = true;
        }
        Ok(())
    }

    /// Transfer with retries. Returns the stored location and attempts used.
    async fn transfer(&mut self) -> Result<(BlobLocation, u32), UploadError> {
        let mut attempt = 0;
        let mut last_error: Option<BlobError> = None;

        loop {
            attempt += 1;
            let stream = match (self.source.open(), last_error.take()) {
                (Some(stream), _) => stream,
                (None, Some(previous)) => {
                    warn!(game_id = %self.request.game_id, "Byte source cannot be replayed, giving up");
                    return Err(UploadError::TransferFailed {
                        attempts: attempt - 1,
                        source: previous,
                    });
                }
                (None, None) => {
                    return Err(UploadError::InvalidRequest(
                        "byte source produced no stream".to_string(),
                    ))
                }
            };

            metrics::UPLOAD_ATTEMPTS.inc();
            match self.attempt(stream).await {
                Ok(location) => return Ok((location, attempt)),
                Err(e) if e.is_retryable() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.backoff(attempt);
                    metrics::UPLOAD_RETRIES.inc();
                    warn!(
                        game_id = %self.request.game_id,
                        asset_id = %self.asset_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Transfer attempt failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(UploadError::TransferFailed {
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    /// One bounded `put`, forwarding byte progress as it arrives.
    async fn attempt(&mut self, stream: ByteStream) -> Result<BlobLocation, BlobError> {
        let (tx, mut rx) = mpsc::channel(64);
        let timeout = self.attempt_timeout;

        let put = tokio::time::timeout(timeout, self.blobs.put(&self.key, stream, Some(tx)));
        let progress = &mut self.progress;
        let forward = async {
            while let Some(update) = rx.recv().await {
                progress.report_bytes(update.bytes_transferred);
            }
        };

        let (result, ()) = tokio::join!(put, forward);
        result.unwrap_or(Err(BlobError::Timeout {
            timeout_secs: timeout.as_secs(),
        }))
    }

    /// Create the asset, report completion, and hand off to transcoding.
    async fn register(
        &mut self,
        location: BlobLocation,
        attempts: u32,
        started: Instant,
    ) -> Result<UploadOutcome, UploadError> {
        let asset = self.assets.create(CreateAssetRequest {
            id: self.asset_id.clone(),
            owner_id: self.request.owner_id.clone(),
            game_id: self.request.game_id.clone(),
            raw_location: location.key.clone(),
            size_bytes: location.size_bytes,
        })?;
        self.progress.finish();

        let elapsed = started.elapsed();
        metrics::UPLOADS_TOTAL.with_label_values(&["success"]).inc();
        metrics::BYTES_UPLOADED.inc_by(location.size_bytes);
        metrics::UPLOAD_DURATION
            .with_label_values(&["success"])
            .observe(elapsed.as_secs_f64());
        info!(
            game_id = %asset.game_id,
            asset_id = %asset.id,
            size_bytes = location.size_bytes,
            attempts,
            "Upload completed"
        );
        self.emit(AuditEvent::UploadCompleted {
            game_id: asset.game_id.clone(),
            asset_id: asset.id.clone(),
            size_bytes: location.size_bytes,
            attempts,
            duration_ms: elapsed.as_millis() as u64,
        })
        .await;

        if let Err(e) = self.transcoder.submit(&asset.id, &asset.raw_location).await {
            metrics::TRANSCODE_SUBMIT_FAILURES.inc();
            error!(asset_id = %asset.id, "Failed to submit transcode job: {}", e);
            self.emit(AuditEvent::TranscodeSubmitFailed {
                asset_id: asset.id.clone(),
                error: e.to_string(),
            })
            .await;
        }

        if let Some(ref supervisor) = self.supervisor {
            if let Err(e) = supervisor.watch(&asset.id).await {
                warn!(asset_id = %asset.id, "Failed to start polling: {}", e);
            }
        }

        Ok(UploadOutcome {
            asset,
            attempts,
            size_bytes: location.size_bytes,
        })
    }

    /// Remove partial data and record why the upload ended.
    async fn discard(&self, error: &UploadError, started: Instant) {
        if let Err(e) = self.blobs.delete(&self.key).await {
            warn!(key = %self.key, "Failed to delete partial upload: {}", e);
        }

        let result = match error {
            UploadError::Cancelled => "cancelled",
            _ => "failed",
        };
        metrics::UPLOADS_TOTAL.with_label_values(&[result]).inc();
        metrics::UPLOAD_DURATION
            .with_label_values(&[result])
            .observe(started.elapsed().as_secs_f64());

        let event = match error {
            UploadError::Cancelled => {
                info!(game_id = %self.request.game_id, asset_id = %self.asset_id, "Upload cancelled");
                AuditEvent::UploadCancelled {
                    game_id: self.request.game_id.clone(),
                    asset_id: self.asset_id.clone(),
                }
            }
            other => {
                error!(game_id = %self.request.game_id, asset_id = %self.asset_id, "Upload failed: {}", other);
                let attempts = match other {
                    UploadError::TransferFailed { attempts, .. } => *attempts,
                    _ => 0,
                };
                AuditEvent::UploadFailed {
                    game_id: self.request.game_id.clone(),
                    asset_id: self.asset_id.clone(),
                    attempts,
                    error: other.to_string(),
                }
            }
        };
        self.emit(event).await;
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            debug!("Upload cancel signal received");
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
