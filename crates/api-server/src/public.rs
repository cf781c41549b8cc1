use axum::{extract::State, Json};
use engine_core::PublicLatestRun;
use serde_json::{json, Value};

use crate::{ApiResponse, AppError, AppState};

/// Liveness probe; no auth.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Public landing data: the latest successful result per tool, shaped to
/// the free tier before it was stored. No auth.
pub async fn latest_runs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PublicLatestRun>>>, AppError> {
    let rows = state.store.list_public_latest().await?;
    Ok(ApiResponse::ok(rows))
}
