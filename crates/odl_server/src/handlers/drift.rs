//! Drift and regression handlers.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use odl_core::regression::QuestionSet;
use odl_core::types::DriftStatus;
use odl_core::OdlError;

use super::workspaces::internal;
use crate::error::AppError;
use crate::state::AppState;

async fn workspace_of_ontology(state: &AppState, ontology_id: Uuid) -> Result<Uuid, AppError> {
    Ok(state.service.get_ontology(ontology_id).await?.workspace_id)
}

pub async fn detect_drift(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let workspace_id = workspace_of_ontology(&state, ontology_id).await?;
    let service = Arc::clone(&state.service);
    let task_id = state
        .runner
        .submit(
            workspace_id,
            "drift",
            Box::new(move |cancel| {
                Box::pin(async move {
                    let summary = service.detect_drift(ontology_id, &cancel).await?;
                    serde_json::to_value(&summary).map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))
                })
            }),
        )
        .await;
    Ok(Json(json!({"task_id": task_id})))
}

#[derive(Debug, Deserialize)]
pub struct DriftEventsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn list_drift_events(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
    Query(query): Query<DriftEventsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(DriftStatus::parse(s).ok_or_else(|| {
            AppError(OdlError::InvalidStructure(vec![
                odl_core::validate::ValidationIssue::structural(
                    "/status",
                    format!("unknown drift status '{s}'"),
                ),
            ]))
        })?),
    };
    let events = state.service.list_drift_events(ontology_id, status).await?;
    Ok(Json(serde_json::to_value(events).map_err(internal)?))
}

pub async fn resolve_drift_event(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .service
        .update_drift_event(event_id, DriftStatus::Resolved)
        .await?;
    Ok(Json(json!({"event_id": event_id, "status": "RESOLVED"})))
}

pub async fn ignore_drift_event(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .service
        .update_drift_event(event_id, DriftStatus::Ignored)
        .await?;
    Ok(Json(json!({"event_id": event_id, "status": "IGNORED"})))
}

pub async fn run_regression(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
    Json(set): Json<QuestionSet>,
) -> Result<Json<serde_json::Value>, AppError> {
    let workspace_id = workspace_of_ontology(&state, ontology_id).await?;
    let service = Arc::clone(&state.service);
    let task_id = state
        .runner
        .submit(
            workspace_id,
            "regression",
            Box::new(move |cancel| {
                Box::pin(async move {
                    let run = service.run_regression(ontology_id, &set, &cancel).await?;
                    serde_json::to_value(&run).map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))
                })
            }),
        )
        .await;
    Ok(Json(json!({"task_id": task_id})))
}
