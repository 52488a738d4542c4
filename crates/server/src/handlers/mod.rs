//! HTTP handlers.

pub mod attach;
pub mod uploads;

pub use attach::attach_to_product;
pub use uploads::{complete_upload, get_upload_ready, get_upload_status, upload_chunk};

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;

/// GET /health - Liveness probe touching both backing stores.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
