//! Task status and cancellation handlers.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::workspaces::internal;
use crate::error::AppError;
use crate::state::AppState;

pub async fn get_task(
    Extension(state): Extension<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = state.runner.status(task_id).await?;
    Ok(Json(serde_json::to_value(status).map_err(internal)?))
}

pub async fn cancel_task(
    Extension(state): Extension<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.runner.cancel(task_id).await?;
    Ok(Json(json!({"task_id": task_id, "cancel_requested": true})))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
}

pub async fn list_tasks(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tasks = state.runner.list(query.workspace_id).await;
    Ok(Json(serde_json::to_value(tasks).map_err(internal)?))
}
