//! HTTP surface for game film ingestion, processing status, and clips.

pub mod api;
pub mod metrics;
pub mod state;
