//! Clip storage trait and types.

use thiserror::Error;

use super::{Clip, Visibility};
use crate::asset::AssetError;

/// Error type for clip timeline operations.
#[derive(Debug, Error)]
pub enum ClipError {
    /// The clip violates a timeline invariant. Nothing was written.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Clip not found: {0}")]
    NotFound(String),

    /// The referenced asset is not registered.
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Asset lookup failed: {0}")]
    Asset(#[from] AssetError),

    #[error("Database error: {0}")]
    Database(String),
}

/// Page size used when a filter does not set one.
pub const DEFAULT_CLIP_LIMIT: i64 = 500;

/// Filter for querying clips.
#[derive(Debug, Clone)]
pub struct ClipFilter {
    pub asset_id: Option<String>,
    pub game_id: Option<String>,
    pub visibility: Option<Visibility>,
    /// Exact tag match.
    pub tag: Option<String>,
    /// Case-insensitive substring over title, description, and play type.
    pub search: Option<String>,
    /// Clips assigned to this player.
    pub player_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ClipFilter {
    fn default() -> Self {
        Self {
            asset_id: None,
            game_id: None,
            visibility: None,
            tag: None,
            search: None,
            player_id: None,
            limit: DEFAULT_CLIP_LIMIT,
            offset: 0,
        }
    }
}

impl ClipFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Persistence for clips. Reads always reflect committed writes.
pub trait ClipStore: Send + Sync {
    /// Insert a new clip.
    fn insert(&self, clip: &Clip) -> Result<(), ClipError>;

    /// Get a clip by id.
    fn get(&self, id: &str) -> Result<Option<Clip>, ClipError>;

    /// Replace an existing clip.
    fn update(&self, clip: &Clip) -> Result<(), ClipError>;

    /// Delete a clip. Errors with `NotFound` if it does not exist.
    fn delete(&self, id: &str) -> Result<(), ClipError>;

    /// List clips ordered by start time, then creation time.
    fn list(&self, filter: &ClipFilter) -> Result<Vec<Clip>, ClipError>;

    /// Count clips matching the filter, ignoring paging.
    fn count(&self, filter: &ClipFilter) -> Result<i64, ClipError>;
}
