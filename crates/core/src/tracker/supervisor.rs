//! Per-asset polling tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::asset::{AssetError, AssetFilter, AssetStore};
use crate::config::TrackerConfig;

use super::processing::ProcessingTracker;
use super::types::TrackerError;

struct PollTask {
    generation: u64,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns one cancellable polling task per watched asset.
///
/// Each task ticks immediately, then every `poll_interval`. It ends on its own
/// once the asset is terminal, or forces a timeout failure once the asset has
/// been processing longer than `max_processing` (measured from the asset's
/// creation time).
pub struct PollSupervisor {
    tracker: Arc<ProcessingTracker>,
    assets: Arc<dyn AssetStore>,
    poll_interval: Duration,
    max_processing: Duration,
    tasks: Arc<RwLock<HashMap<String, PollTask>>>,
    next_generation: AtomicU64,
}

impl PollSupervisor {
    pub fn new(
        tracker: Arc<ProcessingTracker>,
        assets: Arc<dyn AssetStore>,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            tracker,
            assets,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_processing: Duration::from_secs(config.max_processing_secs),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// The tracker the tasks drive.
    pub fn tracker(&self) -> &Arc<ProcessingTracker> {
        &self.tracker
    }

    /// Start polling `asset_id`. Returns false if it is already watched.
    pub async fn watch(&self, asset_id: &str) -> Result<bool, TrackerError> {
        let mut tasks = self.tasks.write().await;
        if tasks
            .get(asset_id)
            .is_some_and(|task| !task.handle.is_finished())
        {
            return Ok(false);
        }

        let asset = self
            .assets
            .get(asset_id)?
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))?;
        if asset.is_terminal() {
            debug!(asset_id = %asset_id, "Asset already terminal, not watching");
            return Ok(false);
        }

        let elapsed = (Utc::now() - asset.created_at).to_std().unwrap_or_default();
        let deadline = Instant::now() + self.max_processing.saturating_sub(elapsed);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = self.spawn_poll_loop(asset_id.to_string(), generation, deadline, cancel_rx);

        tasks.insert(
            asset_id.to_string(),
            PollTask {
                generation,
                cancel_tx,
                handle,
            },
        );
        info!(asset_id = %asset_id, "Watching asset");
        Ok(true)
    }

    /// Stop polling `asset_id`. Committed state is left as is.
    pub async fn unwatch(&self, asset_id: &str) -> bool {
        match self.tasks.write().await.remove(asset_id) {
            Some(task) => {
                let _ = task.cancel_tx.send(true);
                debug!(asset_id = %asset_id, "Stopped watching asset");
                true
            }
            None => false,
        }
    }

    pub async fn is_watching(&self, asset_id: &str) -> bool {
        self.tasks
            .read()
            .await
            .get(asset_id)
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Asset ids with a live polling task.
    pub async fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tasks
            .read()
            .await
            .iter()
            .filter(|(_, task)| !task.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Watch every asset the registry still has in a non-terminal state.
    pub async fn resume_pending(&self) -> Result<usize, TrackerError> {
        // Collect first: watched assets may finish while we page.
        let mut ids = Vec::new();
        loop {
            let page = self.assets.list(
                &AssetFilter::new()
                    .unfinished()
                    .with_limit(100)
                    .with_offset(ids.len() as i64),
            )?;
            if page.is_empty() {
                break;
            }
            ids.extend(page.into_iter().map(|asset| asset.id));
        }

        let mut started = 0;
        for asset_id in ids {
            if self.watch(&asset_id).await? {
                started += 1;
            }
        }

        if started > 0 {
            info!("Resumed polling for {} unfinished assets", started);
        }
        Ok(started)
    }

    /// Cancel every task and wait for them to exit.
    pub async fn shutdown(&self) {
        let tasks: Vec<(String, PollTask)> = self.tasks.write().await.drain().collect();
        if tasks.is_empty() {
            return;
        }

        info!("Stopping {} polling tasks", tasks.len());
        for (_, task) in &tasks {
            let _ = task.cancel_tx.send(true);
        }
        for (asset_id, task) in tasks {
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!(asset_id = %asset_id, "Polling task panicked: {}", e);
                }
            }
        }
    }

    fn spawn_poll_loop(
        &self,
        asset_id: String,
        generation: u64,
        deadline: Instant,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(&self.tracker);
        let tasks = Arc::clone(&self.tasks);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        debug!(asset_id = %asset_id, "Polling cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        match Self::tick(&tracker, &asset_id, deadline).await {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(TrackerError::Asset(AssetError::NotFound(_))) => {
                                warn!(asset_id = %asset_id, "Watched asset disappeared");
                                break;
                            }
                            Err(e) => warn!(asset_id = %asset_id, "Poll failed: {}", e),
                        }
                    }
                }
            }

            let mut tasks = tasks.write().await;
            if tasks.get(&asset_id).is_some_and(|t| t.generation == generation) {
                tasks.remove(&asset_id);
            }
        })
    }

    /// One poll tick. Returns true once the asset is terminal.
    async fn tick(
        tracker: &ProcessingTracker,
        asset_id: &str,
        deadline: Instant,
    ) -> Result<bool, TrackerError> {
        let polled = tracker.poll(asset_id).await;
        if polled.as_ref().is_ok_and(|outcome| outcome.is_terminal()) {
            return Ok(true);
        }

        // The ceiling applies even when this poll failed.
        if Instant::now() >= deadline {
            if let Err(ref e) = polled {
                warn!(asset_id = %asset_id, "Poll failed past the processing ceiling: {}", e);
            }
            let outcome = tracker.force_timeout(asset_id).await?;
            return Ok(outcome.is_terminal());
        }

        polled.map(|_| false)
    }
}
