//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Extra multipart framing allowance on top of the chunk size cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_chunk_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Health check (intentionally unauthenticated for load balancers)
        .route("/health", get(handlers::health_check))
        // Upload surface
        .route("/upload/chunk", post(handlers::upload_chunk))
        .route("/upload/complete", post(handlers::complete_upload))
        .route("/upload/{upload_id}/status", get(handlers::get_upload_status))
        .route("/upload/{upload_id}/ready", get(handlers::get_upload_ready))
        // Attachment resolver
        .route("/upload/attach-to-product", post(handlers::attach_to_product))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
