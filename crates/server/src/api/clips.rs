//! Clip timeline API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use filmroom_core::{Clip, ClipFilter, ClipUpdate, CreateClipRequest, Visibility};

use super::error::ApiError;
use crate::state::AppState;

/// Maximum allowed limit for clip queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for clip queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing clips
#[derive(Debug, Default, Deserialize)]
pub struct ListClipsParams {
    pub asset_id: Option<String>,
    pub game_id: Option<String>,
    /// "team", "player" or "coach"
    pub visibility: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive text match on title, description and play type
    pub search: Option<String>,
    /// Clips assigned to this player
    pub player_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing clips
#[derive(Debug, Serialize)]
pub struct ListClipsResponse {
    pub clips: Vec<Clip>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Create a clip on an asset's timeline
pub async fn create_clip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateClipRequest>,
) -> Result<(StatusCode, Json<Clip>), ApiError> {
    let clip = state.timeline().create_clip(request)?;
    state.ws_broadcaster().clip_changed(&clip, "created");
    Ok((StatusCode::CREATED, Json(clip)))
}

/// List clips matching the query
pub async fn list_clips(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListClipsParams>,
) -> Result<Json<ListClipsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = ClipFilter::new();
    if let Some(asset_id) = params.asset_id {
        filter = filter.with_asset(asset_id);
    }
    if let Some(game_id) = params.game_id {
        filter = filter.with_game(game_id);
    }
    if let Some(visibility) = params.visibility {
        let visibility: Visibility = visibility.parse()?;
        filter = filter.with_visibility(visibility);
    }
    if let Some(tag) = params.tag {
        filter = filter.with_tag(tag);
    }
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search);
    }
    if let Some(player_id) = params.player_id {
        filter = filter.with_player(player_id);
    }

    let total = state.timeline().count_clips(&filter)?;
    let clips = state
        .timeline()
        .list_clips(&filter.with_limit(limit).with_offset(offset))?;

    Ok(Json(ListClipsResponse {
        clips,
        total,
        limit,
        offset,
    }))
}

/// Get a clip by id
pub async fn get_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Clip>, ApiError> {
    Ok(Json(state.timeline().get_clip(&id)?))
}

/// Apply a partial update to a clip
pub async fn update_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<ClipUpdate>,
) -> Result<Json<Clip>, ApiError> {
    let clip = state.timeline().update_clip(&id, update)?;
    state.ws_broadcaster().clip_changed(&clip, "updated");
    Ok(Json(clip))
}

/// Delete a clip
pub async fn delete_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let clip = state.timeline().delete_clip(&id)?;
    state.ws_broadcaster().clip_changed(&clip, "deleted");
    Ok(StatusCode::NO_CONTENT)
}
