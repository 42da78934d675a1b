//! Workspace handlers.

use std::sync::Arc;

use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

pub async fn create_workspace(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateWorkspaceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let workspace = state.service.create_workspace(&request.name).await?;
    Ok(Json(serde_json::to_value(workspace).map_err(internal)?))
}

pub async fn get_workspace(
    Extension(state): Extension<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let workspace = state.service.get_workspace(workspace_id).await?;
    Ok(Json(serde_json::to_value(workspace).map_err(internal)?))
}

pub(crate) fn internal(e: serde_json::Error) -> AppError {
    AppError(odl_core::OdlError::Internal(anyhow::anyhow!(e)))
}
