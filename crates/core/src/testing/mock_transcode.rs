//! Mock transcode job service for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::transcode::{
    JobStatus, SubmitJobRequest, TranscodeError, TranscodeOutput, TranscodeService,
};

/// Scriptable [`TranscodeService`].
///
/// - Submitted jobs start `Pending`; status can be moved with
///   [`set_status`](Self::set_status), [`complete`](Self::complete) or
///   [`fail`](Self::fail).
/// - Unknown assets answer `JobNotFound`.
/// - [`set_next_error`](Self::set_next_error) fails the next call of any kind.
/// - Status lookups are counted per asset.
/// - [`set_submit_delay`](Self::set_submit_delay) slows down `submit`.
#[derive(Debug, Default)]
pub struct MockTranscodeService {
    statuses: Arc<RwLock<HashMap<String, JobStatus>>>,
    results: Arc<RwLock<HashMap<String, TranscodeOutput>>>,
    submitted: Arc<RwLock<Vec<SubmitJobRequest>>>,
    status_calls: Arc<RwLock<HashMap<String, usize>>>,
    next_error: Arc<RwLock<Option<TranscodeError>>>,
    submit_delay: Arc<RwLock<Option<Duration>>>,
}

impl MockTranscodeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status reported for an asset.
    pub async fn set_status(&self, asset_id: &str, status: JobStatus) {
        self.statuses
            .write()
            .await
            .insert(asset_id.to_string(), status);
    }

    /// Mark the job completed with `output` as its result.
    pub async fn complete(&self, asset_id: &str, output: TranscodeOutput) {
        self.results
            .write()
            .await
            .insert(asset_id.to_string(), output);
        self.set_status(asset_id, JobStatus::Completed).await;
    }

    /// Mark the job failed.
    pub async fn fail(&self, asset_id: &str, reason: &str) {
        self.set_status(
            asset_id,
            JobStatus::Failed {
                reason: reason.to_string(),
            },
        )
        .await;
    }

    /// Fail the next call with `error`.
    pub async fn set_next_error(&self, error: TranscodeError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Make every `submit` take `delay` before answering.
    pub async fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.write().await = Some(delay);
    }

    /// Jobs submitted so far, in order.
    pub async fn submitted(&self) -> Vec<SubmitJobRequest> {
        self.submitted.read().await.clone()
    }

    /// Number of status lookups made for an asset.
    pub async fn status_calls(&self, asset_id: &str) -> usize {
        self.status_calls
            .read()
            .await
            .get(asset_id)
            .copied()
            .unwrap_or(0)
    }

    async fn take_error(&self) -> Option<TranscodeError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl TranscodeService for MockTranscodeService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, asset_id: &str, source_location: &str) -> Result<(), TranscodeError> {
        let delay = *self.submit_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.take_error().await {
            return Err(e);
        }

        self.submitted.write().await.push(SubmitJobRequest {
            asset_id: asset_id.to_string(),
            source_location: source_location.to_string(),
        });
        self.statuses
            .write()
            .await
            .entry(asset_id.to_string())
            .or_insert(JobStatus::Pending);
        Ok(())
    }

    async fn status(&self, asset_id: &str) -> Result<JobStatus, TranscodeError> {
        *self
            .status_calls
            .write()
            .await
            .entry(asset_id.to_string())
            .or_insert(0) += 1;

        if let Some(e) = self.take_error().await {
            return Err(e);
        }

        self.statuses
            .read()
            .await
            .get(asset_id)
            .cloned()
            .ok_or_else(|| TranscodeError::JobNotFound(asset_id.to_string()))
    }

    async fn result(&self, asset_id: &str) -> Result<TranscodeOutput, TranscodeError> {
        if let Some(e) = self.take_error().await {
            return Err(e);
        }

        self.results
            .read()
            .await
            .get(asset_id)
            .cloned()
            .ok_or_else(|| TranscodeError::JobNotFound(asset_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_starts_pending() {
        let mock = MockTranscodeService::new();
        mock.submit("a1", "raw/g/a1/film.mp4").await.unwrap();

        assert_eq!(mock.status("a1").await.unwrap(), JobStatus::Pending);
        assert_eq!(mock.submitted().await[0].source_location, "raw/g/a1/film.mp4");
        assert_eq!(mock.status_calls("a1").await, 1);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed_once() {
        let mock = MockTranscodeService::new();
        mock.set_status("a1", JobStatus::Processing).await;
        mock.set_next_error(TranscodeError::Timeout).await;

        assert!(mock.status("a1").await.is_err());
        assert_eq!(mock.status("a1").await.unwrap(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let mock = MockTranscodeService::new();
        assert!(matches!(
            mock.result("nope").await,
            Err(TranscodeError::JobNotFound(_))
        ));
    }
}
