//! Filesystem-backed blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::StorageConfig;

use super::error::BlobError;
use super::traits::BlobStore;
use super::types::{BlobLocation, ByteStream, SignedUrl, TransferProgress};

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_.-]*$").unwrap());

/// Blob store writing under a root directory.
pub struct FsBlobStore {
    config: StorageConfig,
}

impl FsBlobStore {
    /// Creates a new store from configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Rejects keys that are malformed or could escape the root.
    fn validate_key(key: &str) -> Result<(), BlobError> {
        if !KEY_PATTERN.is_match(key) || key.split('/').any(|seg| seg == "..") {
            return Err(BlobError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.config.root.join(key)
    }

    fn partial_path(&self, key: &str) -> PathBuf {
        self.config.root.join(format!("{}.part", key))
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let payload = format!("{}:{}:{}", key, expires, self.config.signing_secret);
        format!("{:x}", Sha256::digest(payload.as_bytes()))
    }

    /// Writes the stream to the partial file, returning size and digest.
    async fn write_partial(
        &self,
        key: &str,
        mut stream: ByteStream,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<(u64, String), BlobError> {
        let partial = self.partial_path(key);
        if let Some(parent) = partial.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = File::create(&partial).await?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size_bytes, file);
        let mut digest = md5::Context::new();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| BlobError::interrupted(e.to_string()))?;
            digest.consume(&chunk);
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(ref tx) = progress_tx {
                let _ = tx
                    .send(TransferProgress {
                        bytes_transferred: written,
                    })
                    .await;
            }
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        Ok((written, format!("{:x}", digest.compute())))
    }

    async fn remove_if_present(path: &Path) -> Result<(), BlobError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn put(
        &self,
        key: &str,
        stream: ByteStream,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<BlobLocation, BlobError> {
        Self::validate_key(key)?;

        let (size_bytes, etag) = match self.write_partial(key, stream, progress_tx).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(cleanup) = Self::remove_if_present(&self.partial_path(key)).await {
                    warn!("Failed to remove partial blob {}: {}", key, cleanup);
                }
                return Err(e);
            }
        };

        fs::rename(self.partial_path(key), self.blob_path(key)).await?;
        debug!("Stored blob {} ({} bytes)", key, size_bytes);

        Ok(BlobLocation {
            key: key.to_string(),
            size_bytes,
            etag,
        })
    }

    async fn signed_url(&self, key: &str) -> Result<SignedUrl, BlobError> {
        Self::validate_key(key)?;
        if !self.exists(key).await? {
            return Err(BlobError::NotFound {
                key: key.to_string(),
            });
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(self.config.url_ttl_secs as i64);
        let expires = expires_at.timestamp();
        let encoded_key = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(SignedUrl {
            url: format!(
                "{}/{}?expires={}&signature={}",
                self.config.public_base_url.trim_end_matches('/'),
                encoded_key,
                expires,
                self.sign(key, expires)
            ),
            expires_at,
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Self::validate_key(key)?;
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        Self::validate_key(key)?;
        Self::remove_if_present(&self.partial_path(key)).await?;
        Self::remove_if_present(&self.blob_path(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> FsBlobStore {
        FsBlobStore::new(StorageConfig {
            root: temp.path().to_path_buf(),
            public_base_url: "https://cdn.example.com/film/".to_string(),
            signing_secret: "secret".to_string(),
            url_ttl_secs: 600,
            chunk_size_bytes: 1024,
        })
    }

    fn chunks(parts: &[&'static str]) -> ByteStream {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn test_put_writes_blob_and_reports_progress() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let (tx, mut rx) = mpsc::channel(16);

        let location = store
            .put("raw/game-1/a.mp4", chunks(&["hello ", "world"]), Some(tx))
            .await
            .unwrap();

        assert_eq!(location.size_bytes, 11);
        assert_eq!(location.etag, format!("{:x}", md5::compute(b"hello world")));
        assert!(store.exists("raw/game-1/a.mp4").await.unwrap());
        assert!(!temp.path().join("raw/game-1/a.mp4.part").exists());

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p.bytes_transferred);
        }
        assert_eq!(seen, vec![6, 11]);
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ])
        .boxed();

        let err = store.put("raw/game-1/b.mp4", failing, None).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(!store.exists("raw/game-1/b.mp4").await.unwrap());
        assert!(!temp.path().join("raw/game-1/b.mp4.part").exists());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        for key in ["../escape.mp4", "raw/../../x", "/abs/path", ""] {
            let err = store.put(key, chunks(&["x"]), None).await.unwrap_err();
            assert!(matches!(err, BlobError::InvalidKey { .. }), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_signed_url_shape() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store
            .put("variants/a/720p.mp4", chunks(&["data"]), None)
            .await
            .unwrap();

        let signed = store.signed_url("variants/a/720p.mp4").await.unwrap();

        assert!(signed
            .url
            .starts_with("https://cdn.example.com/film/variants/a/720p.mp4?expires="));
        let expected_sig = store.sign("variants/a/720p.mp4", signed.expires_at.timestamp());
        assert!(signed.url.ends_with(&format!("signature={}", expected_sig)));
        assert!(signed.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_signed_url_missing_blob() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let err = store.signed_url("missing.mp4").await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.put("a.mp4", chunks(&["x"]), None).await.unwrap();

        store.delete("a.mp4").await.unwrap();
        store.delete("a.mp4").await.unwrap();
        assert!(!store.exists("a.mp4").await.unwrap());
    }
}
