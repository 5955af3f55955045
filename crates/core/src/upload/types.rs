//! Upload request, outcome, and error types.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;

use crate::asset::{AssetError, VideoAsset};
use crate::blob::{BlobError, ByteStream};

/// Errors from the upload coordinator.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Another upload for the same game is in flight.
    #[error("an upload is already in progress for game {game_id}")]
    Conflict { game_id: String },

    /// The transfer failed permanently or exhausted its retries.
    #[error("transfer failed after {attempts} attempt(s): {source}")]
    TransferFailed {
        attempts: u32,
        #[source]
        source: BlobError,
    },

    /// The caller cancelled the upload.
    #[error("upload cancelled")]
    Cancelled,

    #[error("invalid upload request: {0}")]
    InvalidRequest(String),

    /// The transfer succeeded but the asset could not be registered.
    #[error("asset registry error: {0}")]
    Asset(#[from] AssetError),

    /// The upload task ended without reporting a result.
    #[error("upload task aborted: {0}")]
    Aborted(String),
}

/// Metadata for one raw footage upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: String,
    pub game_id: String,
    /// Expected size in bytes; 0 when unknown.
    pub size_hint: u64,
    pub content_type: Option<String>,
    pub file_name: String,
}

impl UploadRequest {
    pub fn new(
        owner_id: impl Into<String>,
        game_id: impl Into<String>,
        file_name: impl Into<String>,
        size_hint: u64,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            game_id: game_id.into(),
            size_hint,
            content_type: None,
            file_name: file_name.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File name reduced to characters safe in a blob key.
    pub(crate) fn storage_file_name(&self) -> String {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches(['.', '_', '-']);

        if cleaned.is_empty() {
            "footage.bin".to_string()
        } else {
            cleaned.to_string()
        }
    }

    /// Blob key for the raw upload of `asset_id`.
    pub(crate) fn raw_key(&self, asset_id: &str) -> String {
        format!(
            "raw/{}/{}/{}",
            self.game_id,
            asset_id,
            self.storage_file_name()
        )
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub asset: VideoAsset,
    /// Transfer attempts used, including the successful one.
    pub attempts: u32,
    pub size_bytes: u64,
}

/// Receives upload progress as a whole percentage.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Produces the upload's bytes, once per transfer attempt.
///
/// Every retry restarts from the first byte, so a source that can only be
/// read once makes the upload non-retryable.
pub trait ByteSource: Send + Sync {
    /// A fresh stream from the start, or `None` if the source is exhausted.
    fn open(&self) -> Option<ByteStream>;
}

impl<F> ByteSource for F
where
    F: Fn() -> ByteStream + Send + Sync,
{
    fn open(&self) -> Option<ByteStream> {
        Some(self())
    }
}

/// A stream that can be read exactly once, such as a request body.
pub struct SingleUseSource {
    stream: Mutex<Option<ByteStream>>,
}

impl SingleUseSource {
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl ByteSource for SingleUseSource {
    fn open(&self) -> Option<ByteStream> {
        self.stream.lock().ok().and_then(|mut slot| slot.take())
    }
}
