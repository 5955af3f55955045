//! Upload lifecycle integration tests.
//!
//! These tests drive the upload coordinator end to end:
//! - Progress reporting for a large stream
//! - At-most-one upload per game
//! - Filesystem-backed transfer, registration, and cleanup
//! - Handing new assets to the polling supervisor

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use filmroom_core::{
    config::{StorageConfig, TrackerConfig, UploadConfig},
    testing::{fixtures, MockBlobStore, MockTranscodeService},
    AssetFilter, AssetStore, BlobStore, FsBlobStore, PollSupervisor, ProcessingState, ProcessingTracker,
    ProgressCallback, RetryPolicy, SqliteAssetStore, UploadCoordinator, UploadError,
    UploadRequest,
};

const MB: usize = 1024 * 1024;

fn recorder() -> (Arc<Mutex<Vec<u8>>>, ProgressCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, Arc::new(move |pct| sink.lock().unwrap().push(pct)))
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn test_large_upload_reports_progress_to_completion() {
    let blobs = Arc::new(MockBlobStore::new());
    let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
    let transcoder = Arc::new(MockTranscodeService::new());
    let coordinator = UploadCoordinator::new(
        blobs.clone(),
        assets.clone(),
        transcoder.clone(),
        &UploadConfig::default(),
    );
    let (seen, callback) = recorder();

    let outcome = coordinator
        .upload(
            UploadRequest::new("coach-1", "game-50", "week1.mp4", (50 * MB) as u64),
            fixtures::byte_source(50 * MB, MB),
            Some(callback),
        )
        .await
        .expect("upload should succeed");

    let seen = seen.lock().unwrap().clone();
    assert!(!seen.is_empty());
    assert!(
        seen.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        seen
    );
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(seen.iter().filter(|&&p| p == 100).count(), 1);

    assert_eq!(outcome.asset.state, ProcessingState::Pending);
    assert_eq!(outcome.size_bytes, (50 * MB) as u64);
    let stored = assets.get(&outcome.asset.id).unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Pending);
    assert!(stored.variants.is_empty() && stored.thumbnails.is_empty());

    let submitted = transcoder.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].source_location, outcome.asset.raw_location);
}

#[tokio::test]
async fn test_second_upload_for_same_game_conflicts() {
    let blobs = Arc::new(MockBlobStore::new());
    blobs.set_chunk_delay(Duration::from_millis(10)).await;
    let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
    let coordinator = UploadCoordinator::new(
        blobs.clone(),
        assets.clone(),
        Arc::new(MockTranscodeService::new()),
        &UploadConfig::default(),
    );

    let first = coordinator
        .begin_upload(
            UploadRequest::new("coach", "game-7", "first.mp4", 1000),
            fixtures::byte_source(1000, 100),
            None,
        )
        .unwrap();
    assert_eq!(coordinator.in_flight(), vec!["game-7".to_string()]);

    let err = coordinator
        .upload(
            UploadRequest::new("coach", "game-7", "second.mp4", 1000),
            fixtures::byte_source(1000, 100),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Conflict { ref game_id } if game_id == "game-7"));

    let outcome = first.wait().await.expect("first upload unaffected");
    assert_eq!(outcome.size_bytes, 1000);
    assert_eq!(assets.list_by_game("game-7").unwrap().len(), 1);

    // The game is free again once the first upload is done.
    coordinator
        .upload(
            UploadRequest::new("coach", "game-7", "third.mp4", 10),
            fixtures::byte_source(10, 10),
            None,
        )
        .await
        .unwrap();
    assert_eq!(assets.list_by_game("game-7").unwrap().len(), 2);
}

#[tokio::test]
async fn test_filesystem_upload_persists_blob_and_asset() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let blobs = Arc::new(FsBlobStore::new(StorageConfig {
        root: temp.path().join("media"),
        public_base_url: "https://film.example.com/media".to_string(),
        signing_secret: "s3cret".to_string(),
        ..Default::default()
    }));
    let assets = Arc::new(
        SqliteAssetStore::new(&temp.path().join("filmroom.db")).expect("Failed to open store"),
    );
    let coordinator = UploadCoordinator::new(
        blobs.clone(),
        assets.clone(),
        Arc::new(MockTranscodeService::new()),
        &UploadConfig::default(),
    );

    let outcome = coordinator
        .upload(
            UploadRequest::new("coach", "game-3", "Home vs Eagles.mov", (3 * MB) as u64),
            fixtures::byte_source(3 * MB, 64 * 1024),
            None,
        )
        .await
        .unwrap();

    let path = temp.path().join("media").join(&outcome.asset.raw_location);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), (3 * MB) as u64);
    assert!(outcome.asset.raw_location.ends_with("/Home_vs_Eagles.mov"));

    let signed = blobs.signed_url(&outcome.asset.raw_location).await.unwrap();
    assert!(signed.url.starts_with("https://film.example.com/media/raw/game-3/"));

    // Reopening the registry sees the same record.
    drop(coordinator);
    let reopened = SqliteAssetStore::new(&temp.path().join("filmroom.db")).unwrap();
    let latest = reopened.latest_for_game("game-3").unwrap().unwrap();
    assert_eq!(latest.id, outcome.asset.id);
    assert_eq!(latest.size_bytes, (3 * MB) as u64);
}

#[tokio::test]
async fn test_cancelled_filesystem_upload_leaves_nothing_behind() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let root = temp.path().join("media");
    let blobs = Arc::new(FsBlobStore::new(StorageConfig {
        root: root.clone(),
        ..Default::default()
    }));
    let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
    let coordinator = UploadCoordinator::new(
        blobs,
        assets.clone(),
        Arc::new(MockTranscodeService::new()),
        &UploadConfig::default(),
    );

    // A stream that never finishes after its first chunk.
    let source: Box<dyn filmroom_core::ByteSource> = Box::new(|| -> filmroom_core::ByteStream {
        use futures::StreamExt;
        let head = futures::stream::iter(vec![Ok(bytes::Bytes::from(vec![1u8; 4096]))]);
        head.chain(futures::stream::pending()).boxed()
    });

    let handle = coordinator
        .begin_upload(UploadRequest::new("coach", "game-9", "film.mp4", 8192), source, None)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.cancel());

    assert!(matches!(handle.wait().await, Err(UploadError::Cancelled)));
    assert!(assets.list_by_game("game-9").unwrap().is_empty());

    let leftovers: Vec<_> = walk(&root);
    assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    assert!(coordinator.in_flight().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_register_nothing() {
    let blobs = Arc::new(MockBlobStore::new());
    for _ in 0..3 {
        blobs
            .push_failure(filmroom_core::BlobError::interrupted("connection reset"))
            .await;
    }
    let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
    let coordinator = UploadCoordinator::new(
        blobs.clone(),
        assets.clone(),
        Arc::new(MockTranscodeService::new()),
        &UploadConfig::default(),
    )
    .with_retry_policy(fast_retries());

    let err = coordinator
        .upload(
            UploadRequest::new("coach", "game-1", "film.mp4", 100),
            fixtures::byte_source(100, 10),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::TransferFailed { attempts: 3, .. }));
    assert_eq!(blobs.put_attempts().await, 3);
    assert!(assets.list(&AssetFilter::new()).unwrap().is_empty());
    assert!(blobs.keys().await.is_empty());
}

#[tokio::test]
async fn test_completed_upload_is_watched_immediately() {
    let blobs = Arc::new(MockBlobStore::new());
    let assets = Arc::new(SqliteAssetStore::in_memory().unwrap());
    let transcoder = Arc::new(MockTranscodeService::new());
    let tracker = Arc::new(ProcessingTracker::new(assets.clone(), transcoder.clone()));
    let supervisor = Arc::new(PollSupervisor::new(
        tracker,
        assets.clone(),
        &TrackerConfig::default(),
    ));
    let coordinator = UploadCoordinator::new(
        blobs,
        assets.clone(),
        transcoder.clone(),
        &UploadConfig::default(),
    )
    .with_supervisor(supervisor.clone());

    let outcome = coordinator
        .upload(
            UploadRequest::new("coach", "game-2", "film.mp4", 10),
            fixtures::byte_source(10, 10),
            None,
        )
        .await
        .unwrap();

    assert!(supervisor.is_watching(&outcome.asset.id).await);
    supervisor.shutdown().await;
}

fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(walk(&path));
            } else {
                files.push(path);
            }
        }
    }
    files
}
