use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filmroom_core::{
    create_audit_system, load_config, validate_config, AssetStore, AssetUpdateCallback,
    AuditEvent, AuditStore, ClipStore, ClipTimeline, DisabledTranscodeService, FsBlobStore,
    GameFilmService, HttpTranscodeClient, PollSupervisor, ProcessingTracker, SqliteAssetStore,
    SqliteAuditStore, SqliteClipStore, TranscodeService, UploadCoordinator, VideoAsset,
};
use filmroom_server::api::{create_router, WsBroadcaster};
use filmroom_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

/// How long to wait for queued audit events to be written on shutdown.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("FILMROOM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!("Blob storage root: {:?}", config.storage.root);

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Stores share one SQLite file
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    let asset_store: Arc<dyn AssetStore> = Arc::new(
        SqliteAssetStore::new(&config.database.path).context("Failed to create asset store")?,
    );
    let clip_store: Arc<dyn ClipStore> = Arc::new(
        SqliteClipStore::new(&config.database.path).context("Failed to create clip store")?,
    );
    info!("Record stores initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    let blobs = Arc::new(FsBlobStore::new(config.storage.clone()));

    let transcoder: Arc<dyn TranscodeService> =
        match HttpTranscodeClient::from_config(&config.transcode)
            .context("Failed to create transcode client")?
        {
            Some(client) => {
                info!("Using transcode service at {:?}", config.transcode.url);
                Arc::new(client)
            }
            None => {
                warn!("No transcode service configured; uploads will not be processed");
                Arc::new(DisabledTranscodeService::new())
            }
        };

    let ws_broadcaster = WsBroadcaster::default();

    let broadcaster_for_callback = ws_broadcaster.clone();
    let update_callback: AssetUpdateCallback = Arc::new(move |asset: &VideoAsset| {
        broadcaster_for_callback.asset_updated(asset);
    });

    let tracker = ProcessingTracker::new(Arc::clone(&asset_store), Arc::clone(&transcoder))
        .with_audit(audit_handle.clone())
        .with_update_callback(update_callback);
    let supervisor = Arc::new(PollSupervisor::new(
        Arc::new(tracker),
        Arc::clone(&asset_store),
        &config.tracker,
    ));

    let resumed = supervisor
        .resume_pending()
        .await
        .context("Failed to resume processing status polling")?;
    info!("Resumed polling for {} unfinished asset(s)", resumed);

    let coordinator = UploadCoordinator::new(
        blobs.clone(),
        Arc::clone(&asset_store),
        Arc::clone(&transcoder),
        &config.upload,
    )
    .with_supervisor(Arc::clone(&supervisor))
    .with_audit(audit_handle.clone());

    let service = Arc::new(GameFilmService::new(
        Arc::new(coordinator),
        Arc::clone(&supervisor),
        Arc::clone(&asset_store),
        blobs,
    ));

    let timeline = Arc::new(
        ClipTimeline::new(clip_store, Arc::clone(&asset_store)).with_audit(audit_handle.clone()),
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        service,
        timeline,
        Arc::clone(&supervisor),
        audit_store,
        ws_broadcaster,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    supervisor.shutdown().await;
    info!("Status polling stopped");

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone; the tracker
    // holds one through the supervisor.
    drop(supervisor);
    drop(audit_handle);

    match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Audit writer stopped"),
        Err(_) => warn!("Audit writer did not drain in time"),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
