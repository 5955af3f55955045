use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{audit, clips, handlers, videos, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Game film; uploads stream the body so no size limit applies
        .route(
            "/games/{game_id}/video",
            post(videos::upload_video)
                .layer(DefaultBodyLimit::disable())
                .get(videos::get_video_sources),
        )
        .route("/games/{game_id}/video/upload", delete(videos::cancel_upload))
        .route("/games/{game_id}/video/status", get(videos::get_processing_status))
        // Clips
        .route("/clips", post(clips::create_clip).get(clips::list_clips))
        .route(
            "/clips/{id}",
            get(clips::get_clip)
                .patch(clips::update_clip)
                .delete(clips::delete_clip),
        )
        // Live updates
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
