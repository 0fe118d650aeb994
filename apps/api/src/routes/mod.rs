pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};

use crate::cv::handlers as cv_handlers;
use crate::matching::handlers as match_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Multipart bodies must fit the configured upload cap plus field overhead.
    let body_limit = state.config.max_file_size + 64 * 1024;

    Router::new()
        .route("/health", get(health::health_handler))
        // CV pipeline
        .route("/api/v1/cv/upload", post(cv_handlers::handle_upload))
        .route("/api/v1/cv/extract", post(cv_handlers::handle_extract))
        .route("/api/v1/cv/:id", get(cv_handlers::handle_get_cv))
        // Matching
        .route("/api/v1/match", post(match_handlers::handle_match))
        // Embedding queue introspection
        .route("/api/v1/queue/stats", get(cv_handlers::handle_queue_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
