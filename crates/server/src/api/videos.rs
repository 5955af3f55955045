//! Game film endpoints: upload, cancel, playback sources, and processing status.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use filmroom_core::{
    ProcessingStatus, ProgressCallback, SingleUseSource, UploadRequest, UploadedVideo,
    VideoSources,
};

use super::error::ApiError;
use crate::state::AppState;

/// Header carrying the uploading user's id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Query parameters for an upload
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// Original file name; only used to name the stored blob.
    pub file_name: Option<String>,
}

/// Response for an upload cancellation
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub game_id: String,
    pub cancelled: bool,
}

/// Upload raw footage for a game.
///
/// The request body is streamed straight into blob storage. Because the body
/// can only be read once, a transfer interrupted mid-stream is not retried.
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadedVideo>), ApiError> {
    let owner_id = headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing {} header", OWNER_HEADER)))?
        .to_string();

    let size_hint = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let mut request = UploadRequest::new(
        owner_id,
        game_id.clone(),
        params.file_name.unwrap_or_default(),
        size_hint,
    );
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        request = request.with_content_type(content_type);
    }

    let stream = body
        .into_data_stream()
        .map_err(std::io::Error::other)
        .boxed();
    let source = Box::new(SingleUseSource::new(stream));

    let broadcaster = state.ws_broadcaster().clone();
    let progress_game = game_id.clone();
    let on_progress: ProgressCallback = Arc::new(move |percent| {
        broadcaster.upload_progress(&progress_game, percent);
    });

    info!(game_id = %game_id, size_hint, "Receiving game film upload");
    let uploaded = state
        .service()
        .upload_video(request, source, Some(on_progress))
        .await?;

    Ok((StatusCode::CREATED, Json(uploaded)))
}

/// Cancel the in-flight upload for a game.
pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    if !state.service().cancel_upload(&game_id) {
        return Err(ApiError::not_found(format!(
            "no upload in progress for game {}",
            game_id
        )));
    }
    info!(game_id = %game_id, "Upload cancellation requested");
    Ok(Json(CancelResponse {
        game_id,
        cancelled: true,
    }))
}

/// Signed playback URLs and thumbnails for the game's footage.
pub async fn get_video_sources(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<VideoSources>, ApiError> {
    Ok(Json(state.service().get_video_sources(&game_id).await?))
}

/// Processing state of the game's footage.
///
/// A failed or timed-out job is a normal answer here: it comes back as
/// `state: "failed"` with its reason, not as an error status.
pub async fn get_processing_status(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<ProcessingStatus>, ApiError> {
    Ok(Json(
        state.service().check_processing_status(&game_id).await?,
    ))
}
