use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let chunk_limit = state.config.max_chunk_size as usize;

    Router::new()
        // Uploads
        .route(
            "/upload/chunk",
            post(handlers::upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/upload/complete", post(handlers::complete_upload))
        // Shared files (id with optional extension)
        .route("/files/:id", get(handlers::get_file))
        .route("/static/file-preview.svg", get(handlers::placeholder_image))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
