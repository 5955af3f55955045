//! Asset storage trait and types.

use thiserror::Error;

use super::{AssetUpdate, CreateAssetRequest, ProcessingState, VideoAsset};

/// Error type for asset registry operations.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Asset not found.
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// An asset with this id is already registered.
    #[error("Asset already exists: {0}")]
    AlreadyExists(String),

    /// Requested state change does not move forward.
    #[error("Invalid transition for asset {asset_id}: {from} -> {to}")]
    InvalidTransition {
        asset_id: String,
        from: ProcessingState,
        to: ProcessingState,
    },

    /// Compare-and-set lost against a concurrent writer.
    #[error("State conflict for asset {asset_id}: expected {expected}, found {actual}")]
    StateConflict {
        asset_id: String,
        expected: ProcessingState,
        actual: ProcessingState,
    },

    /// Record would violate the artifact/state invariants.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Filter for querying assets.
#[derive(Debug, Clone, Default)]
pub struct AssetFilter {
    pub owner_id: Option<String>,
    pub game_id: Option<String>,
    pub state: Option<ProcessingState>,
    /// Only assets whose state is not terminal.
    pub unfinished: bool,
    pub limit: i64,
    pub offset: i64,
}

impl AssetFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_state(mut self, state: ProcessingState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn unfinished(mut self) -> Self {
        self.unfinished = true;
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

/// Persistence boundary for video assets.
///
/// Implementations guarantee read-after-write within the process: a `get`
/// following an `update` observes it. Every state write goes through either
/// `update` or `transition`, both of which are atomic per asset.
pub trait AssetStore: Send + Sync {
    /// Register a new asset in `Pending` with no artifacts.
    fn create(&self, request: CreateAssetRequest) -> Result<VideoAsset, AssetError>;

    /// Get an asset by id.
    fn get(&self, id: &str) -> Result<Option<VideoAsset>, AssetError>;

    /// Merge a partial update into the asset.
    fn update(&self, id: &str, update: AssetUpdate) -> Result<VideoAsset, AssetError>;

    /// Merge `update` only if the asset is currently in `expected` state.
    fn transition(
        &self,
        id: &str,
        expected: ProcessingState,
        update: AssetUpdate,
    ) -> Result<VideoAsset, AssetError>;

    /// List assets matching the filter, newest first.
    fn list(&self, filter: &AssetFilter) -> Result<Vec<VideoAsset>, AssetError>;

    /// List assets uploaded by an owner.
    fn list_by_owner(&self, owner_id: &str) -> Result<Vec<VideoAsset>, AssetError> {
        self.list(&AssetFilter::new().with_owner(owner_id))
    }

    /// List assets attached to a game, newest first.
    fn list_by_game(&self, game_id: &str) -> Result<Vec<VideoAsset>, AssetError> {
        self.list(&AssetFilter::new().with_game(game_id))
    }

    /// The most recent asset for a game.
    fn latest_for_game(&self, game_id: &str) -> Result<Option<VideoAsset>, AssetError> {
        Ok(self
            .list(&AssetFilter::new().with_game(game_id).with_limit(1))?
            .into_iter()
            .next())
    }
}
