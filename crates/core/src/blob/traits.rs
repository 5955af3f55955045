//! Trait definitions for the blob module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::BlobError;
use super::types::{BlobLocation, ByteStream, SignedUrl, TransferProgress};

/// Durable byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Streams `stream` into storage under `key`.
    ///
    /// Progress updates are sent in order on `progress_tx` when given. If the
    /// receiver is dropped the transfer continues without reporting.
    async fn put(
        &self,
        key: &str,
        stream: ByteStream,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<BlobLocation, BlobError>;

    /// Returns a time-limited URL for reading the blob.
    async fn signed_url(&self, key: &str) -> Result<SignedUrl, BlobError>;

    /// Whether a complete blob exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    /// Removes the blob and any partial data for `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}
