use axum::{extract::State, Extension, Json};
use engine_core::{EngineError, Preset, ToolName};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::{ApiResponse, AppError, AppState};

fn require_pro(state: &AppState, auth: &AuthContext) -> Result<(), AppError> {
    if !state.tiers.presets_allowed(auth.tier) {
        return Err(EngineError::TierDenied("presets".to_string()).into());
    }
    Ok(())
}

pub async fn list_presets(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<Preset>>>, AppError> {
    require_pro(&state, &auth)?;
    let presets = state.store.list_presets(&auth.user_id).await?;
    Ok(ApiResponse::ok(presets))
}

#[derive(Debug, Deserialize)]
pub struct CreatePresetRequest {
    pub name: String,
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn create_preset(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreatePresetRequest>,
) -> Result<Json<ApiResponse<Preset>>, AppError> {
    require_pro(&state, &auth)?;
    // Presets only make sense for dispatchable tools.
    let tool = ToolName::parse(&request.tool)?;
    if request.name.trim().is_empty() {
        return Err(EngineError::Validation("preset name must not be empty".to_string()).into());
    }

    let preset = state
        .store
        .create_preset(
            &auth.user_id,
            request.name.trim(),
            tool.as_str(),
            &request.params,
            request.is_default,
        )
        .await?;
    Ok(ApiResponse::ok(preset))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePresetRequest {
    pub id: String,
    pub name: Option<String>,
    pub params: Option<Value>,
    pub is_default: Option<bool>,
}

pub async fn update_preset(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdatePresetRequest>,
) -> Result<Json<ApiResponse<Preset>>, AppError> {
    require_pro(&state, &auth)?;
    let updated = state
        .store
        .update_preset(
            &auth.user_id,
            &request.id,
            request.name.as_deref(),
            request.params.as_ref(),
            request.is_default,
        )
        .await?;
    match updated {
        Some(preset) => Ok(ApiResponse::ok(preset)),
        None => Err(EngineError::Validation(format!("unknown preset '{}'", request.id)).into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct DeletePresetRequest {
    pub id: String,
}

/// Delete is idempotent: removing a missing preset reports success.
pub async fn delete_preset(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<DeletePresetRequest>,
) -> Result<Json<Value>, AppError> {
    require_pro(&state, &auth)?;
    state.store.delete_preset(&auth.user_id, &request.id).await?;
    Ok(Json(json!({ "success": true })))
}
