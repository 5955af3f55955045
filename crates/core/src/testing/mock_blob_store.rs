//! Mock blob store for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use tokio::sync::{mpsc, RwLock};

use crate::blob::{BlobError, BlobLocation, BlobStore, ByteStream, SignedUrl, TransferProgress};

/// In-memory [`BlobStore`] with scripted failures.
///
/// Failures queued with [`push_failure`](Self::push_failure) are consumed one
/// per `put`: the failing attempt reads and reports the first chunk, then
/// returns the error without storing anything. A per-chunk delay makes
/// transfers slow enough to cancel or collide with.
#[derive(Debug, Default)]
pub struct MockBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    failures: Arc<RwLock<VecDeque<BlobError>>>,
    put_attempts: Arc<RwLock<Vec<String>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    chunk_delay: Arc<RwLock<Option<Duration>>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `put` with `error`.
    pub async fn push_failure(&self, error: BlobError) {
        self.failures.write().await.push_back(error);
    }

    /// Sleep this long before each chunk is consumed.
    pub async fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.write().await = Some(delay);
    }

    /// Seed a blob directly.
    pub async fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.blobs.write().await.insert(key.to_string(), data.into());
    }

    /// Stored bytes for `key`.
    pub async fn stored(&self, key: &str) -> Option<Bytes> {
        self.blobs.read().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of `put` calls made, successful or not.
    pub async fn put_attempts(&self) -> usize {
        self.put_attempts.read().await.len()
    }

    /// Keys passed to `delete`, in order.
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(
        &self,
        key: &str,
        mut stream: ByteStream,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<BlobLocation, BlobError> {
        self.put_attempts.write().await.push(key.to_string());
        let failure = self.failures.write().await.pop_front();
        let delay = *self.chunk_delay.read().await;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let chunk = chunk.map_err(|e| BlobError::interrupted(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            if let Some(ref tx) = progress_tx {
                let _ = tx
                    .send(TransferProgress {
                        bytes_transferred: buffer.len() as u64,
                    })
                    .await;
            }

            if failure.is_some() {
                break;
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }

        let data = buffer.freeze();
        let location = BlobLocation {
            key: key.to_string(),
            size_bytes: data.len() as u64,
            etag: format!("{:x}", md5::compute(&data)),
        };
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(location)
    }

    async fn signed_url(&self, key: &str) -> Result<SignedUrl, BlobError> {
        if !self.exists(key).await? {
            return Err(BlobError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(SignedUrl {
            url: format!("https://blobs.test/{}?signature=mock", key),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.deleted.write().await.push(key.to_string());
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn stream_of(parts: &[&'static str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn test_put_stores_bytes() {
        let store = MockBlobStore::new();
        let location = store.put("k", stream_of(&["ab", "cd"]), None).await.unwrap();

        assert_eq!(location.size_bytes, 4);
        assert_eq!(store.stored("k").await.unwrap(), Bytes::from_static(b"abcd"));
        assert!(store.signed_url("k").await.unwrap().url.contains("/k?"));
    }

    #[tokio::test]
    async fn test_scripted_failure_reports_partial_progress() {
        let store = MockBlobStore::new();
        store.push_failure(BlobError::interrupted("reset")).await;
        let (tx, mut rx) = mpsc::channel(8);

        let err = store
            .put("k", stream_of(&["ab", "cd"]), Some(tx))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(rx.recv().await.unwrap().bytes_transferred, 2);
        assert!(store.stored("k").await.is_none());

        // Only one failure was queued.
        store.put("k", stream_of(&["ab"]), None).await.unwrap();
        assert_eq!(store.put_attempts().await, 2);
    }
}
