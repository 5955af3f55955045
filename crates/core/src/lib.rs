pub mod asset;
pub mod audit;
pub mod blob;
pub mod clip;
pub mod config;
pub mod metrics;
pub mod service;
pub mod testing;
pub mod tracker;
pub mod transcode;
pub mod upload;

pub use asset::{
    AssetError, AssetFilter, AssetStore, AssetUpdate, CreateAssetRequest, ProcessingState,
    Quality, SqliteAssetStore, VideoAsset,
};
pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use blob::{BlobError, BlobLocation, BlobStore, ByteStream, FsBlobStore, SignedUrl};
pub use clip::{
    Clip, ClipError, ClipFilter, ClipStore, ClipTimeline, ClipUpdate, CreateClipRequest,
    Priority, SqliteClipStore, Visibility,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use service::{GameFilmService, ProcessingStatus, ServiceError, UploadedVideo, VideoSources};
pub use tracker::{
    AssetUpdateCallback, PollOutcome, PollSupervisor, ProcessingTracker, TrackerError,
    PROCESSING_TIMEOUT_REASON,
};
pub use transcode::{
    DisabledTranscodeService, HttpTranscodeClient, JobStatus, TranscodeError, TranscodeOutput,
    TranscodeService,
};
pub use upload::{
    ByteSource, ProgressCallback, RetryPolicy, SingleUseSource, UploadCoordinator, UploadError,
    UploadHandle, UploadOutcome, UploadRequest,
};
