use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Router for the recording control API
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session queries
        .route("/recording/status", get(handlers::get_status))
        .route("/recording/preview.png", get(handlers::get_preview))
        // Recording control
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/pause", post(handlers::pause_recording))
        .route("/recording/resume", post(handlers::resume_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/reset", post(handlers::reset_recording))
        // Request spans for every call
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
