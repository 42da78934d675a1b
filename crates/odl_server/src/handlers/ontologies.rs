//! Ontology CRUD handlers.

use std::sync::Arc;

use axum::extract::Path;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::workspaces::internal;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOntologyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_ontology(
    Extension(state): Extension<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    Json(request): Json<CreateOntologyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ontology = state
        .service
        .create_ontology(workspace_id, &request.name, request.description.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(ontology).map_err(internal)?))
}

pub async fn list_ontologies(
    Extension(state): Extension<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ontologies = state.service.list_ontologies(workspace_id).await?;
    Ok(Json(serde_json::to_value(ontologies).map_err(internal)?))
}

pub async fn get_ontology(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ontology = state.service.get_ontology(ontology_id).await?;
    Ok(Json(serde_json::to_value(ontology).map_err(internal)?))
}

pub async fn deactivate_ontology(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.service.deactivate_ontology(ontology_id).await?;
    Ok(Json(json!({"ontology_id": ontology_id, "is_active": false})))
}
