//! Video asset registry.
//!
//! Every uploaded game film is tracked as a [`VideoAsset`] that moves through
//! [`ProcessingState`] as its transcode job progresses.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteAssetStore;
pub use store::{AssetError, AssetFilter, AssetStore};
pub use types::{AssetUpdate, CreateAssetRequest, ProcessingState, Quality, VideoAsset};
