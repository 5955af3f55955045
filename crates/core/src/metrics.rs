//! Prometheus metrics for core components.
//!
//! Covers uploads, processing status polling, and clip timeline writes.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Uploads
// =============================================================================

/// Uploads finished, by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filmroom_uploads_total", "Total uploads by result"),
        &["result"], // "success", "failed", "cancelled", "conflict"
    )
    .unwrap()
});

/// Individual transfer attempts.
pub static UPLOAD_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_upload_attempts_total",
        "Total blob transfer attempts",
    )
    .unwrap()
});

/// Attempts that were retried after a transient error.
pub static UPLOAD_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_upload_retries_total",
        "Transfer attempts retried after a transient error",
    )
    .unwrap()
});

/// Bytes of raw footage stored.
pub static BYTES_UPLOADED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_uploaded_bytes_total",
        "Total bytes of raw footage stored",
    )
    .unwrap()
});

/// Upload wall time in seconds.
pub static UPLOAD_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("filmroom_upload_duration_seconds", "Duration of uploads").buckets(
            vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0],
        ),
        &["result"],
    )
    .unwrap()
});

/// Transcode submissions that failed after upload.
pub static TRANSCODE_SUBMIT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_transcode_submit_failures_total",
        "Transcode jobs that could not be submitted",
    )
    .unwrap()
});

// =============================================================================
// Processing
// =============================================================================

/// Asset state transitions, by target state.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "filmroom_asset_state_transitions_total",
            "Asset processing state transitions",
        ),
        &["to_state"],
    )
    .unwrap()
});

/// Poll ticks, by outcome.
pub static POLLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filmroom_polls_total", "Transcode status polls"),
        &["outcome"], // "unchanged", "transitioned", "lookup_error", "conflict"
    )
    .unwrap()
});

/// Assets failed for exceeding the processing ceiling.
pub static PROCESSING_TIMEOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_processing_timeouts_total",
        "Assets failed for exceeding the processing ceiling",
    )
    .unwrap()
});

// =============================================================================
// Clips
// =============================================================================

/// Clip writes, by operation.
pub static CLIP_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("filmroom_clip_operations_total", "Clip timeline writes"),
        &["operation"], // "create", "update", "delete"
    )
    .unwrap()
});

/// Clip writes rejected by validation.
pub static CLIP_VALIDATION_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "filmroom_clip_validation_failures_total",
        "Clip writes rejected by validation",
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(UPLOADS_TOTAL.clone()),
        Box::new(UPLOAD_ATTEMPTS.clone()),
        Box::new(UPLOAD_RETRIES.clone()),
        Box::new(BYTES_UPLOADED.clone()),
        Box::new(UPLOAD_DURATION.clone()),
        Box::new(TRANSCODE_SUBMIT_FAILURES.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(POLLS_TOTAL.clone()),
        Box::new(PROCESSING_TIMEOUTS.clone()),
        Box::new(CLIP_OPERATIONS.clone()),
        Box::new(CLIP_VALIDATION_FAILURES.clone()),
    ]
}
