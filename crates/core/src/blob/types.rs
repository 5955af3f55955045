//! Types shared by blob store implementations.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A stream of byte chunks fed into a blob store.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Where a blob ended up after a successful put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobLocation {
    /// Storage key; this is the handle persisted on records.
    pub key: String,
    /// Total bytes written.
    pub size_bytes: u64,
    /// Hex MD5 digest of the content.
    pub etag: String,
}

/// Progress update emitted while a put is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes written so far in the current attempt.
    pub bytes_transferred: u64,
}

/// A time-limited URL for reading a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
