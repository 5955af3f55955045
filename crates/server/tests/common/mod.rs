//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture wires the real coordinator, tracker, and clip timeline over
//! SQLite in a temp dir, with mock blob storage and a mock transcode
//! service standing in for the external collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use filmroom_core::{
    config::{DatabaseConfig, ServerConfig, StorageConfig},
    create_audit_system,
    testing::{MockBlobStore, MockTranscodeService},
    AuditStore, ClipTimeline, Config, GameFilmService, PollSupervisor,
    ProcessingTracker, SqliteAssetStore, SqliteAuditStore, SqliteClipStore, UploadCoordinator,
    VideoAsset,
};
use filmroom_server::api::WsBroadcaster;
use filmroom_server::state::AppState;

/// Re-export fixtures for test convenience
pub use filmroom_core::testing::fixtures;

/// In-process server with controllable collaborators.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.upload("game-1", "coach-1", vec![0u8; 1024]).await;
///     assert_eq!(response.status, StatusCode::CREATED);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub blobs: Arc<MockBlobStore>,
    pub transcoder: Arc<MockTranscodeService>,
    pub assets: Arc<SqliteAssetStore>,
    pub service: Arc<GameFilmService>,
    pub supervisor: Arc<PollSupervisor>,
    pub broadcaster: WsBroadcaster,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            storage: StorageConfig {
                root: temp_dir.path().join("media"),
                signing_secret: "test-secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let blobs = Arc::new(MockBlobStore::new());
        let transcoder = Arc::new(MockTranscodeService::new());

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let assets =
            Arc::new(SqliteAssetStore::new(&db_path).expect("Failed to create asset store"));
        let clips = Arc::new(SqliteClipStore::new(&db_path).expect("Failed to create clip store"));

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let broadcaster = WsBroadcaster::default();
        let for_callback = broadcaster.clone();

        let tracker = ProcessingTracker::new(assets.clone(), transcoder.clone())
            .with_audit(audit_handle.clone())
            .with_update_callback(Arc::new(move |asset: &VideoAsset| {
                for_callback.asset_updated(asset)
            }));
        let supervisor = Arc::new(PollSupervisor::new(
            Arc::new(tracker),
            assets.clone(),
            &config.tracker,
        ));

        let coordinator = UploadCoordinator::new(
            blobs.clone(),
            assets.clone(),
            transcoder.clone(),
            &config.upload,
        )
        .with_supervisor(supervisor.clone())
        .with_audit(audit_handle.clone());

        let service = Arc::new(GameFilmService::new(
            Arc::new(coordinator),
            supervisor.clone(),
            assets.clone(),
            blobs.clone(),
        ));
        let timeline =
            Arc::new(ClipTimeline::new(clips, assets.clone()).with_audit(audit_handle));

        let state = Arc::new(AppState::new(
            config,
            service.clone(),
            timeline,
            supervisor.clone(),
            audit_store,
            broadcaster.clone(),
        ));
        let router = filmroom_server::api::create_router(state);

        Self {
            router,
            blobs,
            transcoder,
            assets,
            service,
            supervisor,
            broadcaster,
            temp_dir,
        }
    }

    /// Register a pending asset for a game directly in the registry.
    pub fn register_asset(&self, asset_id: &str, game_id: &str) {
        fixtures::register_asset(self.assets.as_ref(), asset_id, game_id);
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Upload raw bytes as a game's footage.
    pub async fn upload(&self, game_id: &str, owner_id: &str, data: Vec<u8>) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(format!(
                "/api/v1/games/{}/video?file_name=film.mp4",
                game_id
            ))
            .header("x-owner-id", owner_id)
            .header("Content-Type", "video/mp4")
            .header("Content-Length", data.len())
            .body(Body::from(data))
            .unwrap();
        self.send(request).await
    }

    /// Poll `path` until `done` accepts the response, or give up after ~1s.
    pub async fn get_until(&self, path: &str, done: impl Fn(&TestResponse) -> bool) -> TestResponse {
        let mut response = self.get(path).await;
        for _ in 0..100 {
            if done(&response) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            response = self.get(path).await;
        }
        response
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
