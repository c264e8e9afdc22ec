use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/record/start", post(handlers::start_recording))
        .route("/record/stop", post(handlers::stop_recording))
        .route("/record/cancel", post(handlers::cancel_recording))
        .route("/record/status", get(handlers::recording_status))
        // Stored memos
        .route("/memos", get(handlers::list_memos))
        .route(
            "/memos/:url",
            get(handlers::get_memo)
                .put(handlers::update_memo)
                .delete(handlers::delete_memo),
        )
        .route("/memos/:url/audio", get(handlers::get_memo_audio))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
