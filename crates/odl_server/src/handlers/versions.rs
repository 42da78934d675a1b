//! Version lifecycle handlers: create/list/fetch, diff, and the task-backed
//! evaluate / compile / deploy operations.
//!
//! Long operations return `{task_id}` immediately; poll `/tasks/:id`.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use odl_core::compile::{CompileOptions, EnvironmentTarget};
use odl_core::evaluate::ThresholdProfile;
use odl_core::OdlError;

use super::workspaces::internal;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateVersionRequest {
    /// The ODL document itself.
    pub odl: serde_json::Value,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn create_version(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
    Json(request): Json<CreateVersionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let version = state
        .service
        .create_version(
            ontology_id,
            &request.odl.to_string(),
            request.author.as_deref(),
            request.notes.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::to_value(version).map_err(internal)?))
}

pub async fn list_versions(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let versions = state.service.list_versions(ontology_id).await?;
    Ok(Json(serde_json::to_value(versions).map_err(internal)?))
}

pub async fn latest_version(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let version = state
        .service
        .latest_version(ontology_id)
        .await?
        .ok_or_else(|| OdlError::NotFound(format!("ontology {ontology_id} has no versions")))?;
    Ok(Json(serde_json::to_value(version).map_err(internal)?))
}

pub async fn get_version(
    Extension(state): Extension<Arc<AppState>>,
    Path((ontology_id, number)): Path<(Uuid, i32)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let version = state.service.get_version(ontology_id, number).await?;
    Ok(Json(serde_json::to_value(version).map_err(internal)?))
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub old: i32,
    pub new: i32,
}

pub async fn diff_versions(
    Extension(state): Extension<Arc<AppState>>,
    Path(ontology_id): Path<Uuid>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let diff = state
        .service
        .diff_versions(ontology_id, query.old, query.new)
        .await?;
    Ok(Json(serde_json::to_value(diff).map_err(internal)?))
}

fn parse_profile(profile: Option<&str>) -> Result<ThresholdProfile, AppError> {
    match profile {
        None => Ok(ThresholdProfile::Standard),
        Some(s) => ThresholdProfile::parse(s).ok_or_else(|| {
            AppError(OdlError::InvalidStructure(vec![
                odl_core::validate::ValidationIssue::structural(
                    "/profile",
                    format!("unknown threshold profile '{s}'"),
                ),
            ]))
        }),
    }
}

/// Resolve the workspace a version belongs to (task queues are
/// workspace-scoped).
async fn workspace_of_version(state: &AppState, version_id: Uuid) -> Result<Uuid, AppError> {
    let version = state.service.version_by_id(version_id).await?;
    let ontology = state.service.get_ontology(version.ontology_id).await?;
    Ok(ontology.workspace_id)
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub profile: Option<String>,
}

pub async fn evaluate(
    Extension(state): Extension<Arc<AppState>>,
    Path(version_id): Path<Uuid>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = parse_profile(request.profile.as_deref())?;
    let workspace_id = workspace_of_version(&state, version_id).await?;
    let service = Arc::clone(&state.service);
    let task_id = state
        .runner
        .submit(
            workspace_id,
            "evaluate",
            Box::new(move |cancel| {
                Box::pin(async move {
                    let outcome = service.evaluate_version(version_id, profile, &cancel).await?;
                    serde_json::to_value(&outcome).map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))
                })
            }),
        )
        .await;
    Ok(Json(json!({"task_id": task_id})))
}

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub view_name: Option<String>,
    #[serde(default)]
    pub environments: Vec<EnvironmentTarget>,
}

pub async fn compile(
    Extension(state): Extension<Arc<AppState>>,
    Path(version_id): Path<Uuid>,
    Json(request): Json<CompileRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = parse_profile(request.profile.as_deref())?;
    let workspace_id = workspace_of_version(&state, version_id).await?;
    let mut options = CompileOptions::single(
        request.view_name.unwrap_or_else(|| "semantic_view".to_string()),
        Utc::now(),
    );
    options.environments = request.environments;

    let service = Arc::clone(&state.service);
    let task_id = state
        .runner
        .submit(
            workspace_id,
            "compile",
            Box::new(move |cancel| {
                Box::pin(async move {
                    let run = service
                        .compile_version(version_id, profile, options, &cancel)
                        .await?;
                    serde_json::to_value(&run).map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))
                })
            }),
        )
        .await;
    Ok(Json(json!({"task_id": task_id})))
}

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub view_name: String,
    #[serde(default)]
    pub profile: Option<String>,
}

pub async fn deploy(
    Extension(state): Extension<Arc<AppState>>,
    Path(version_id): Path<Uuid>,
    Json(request): Json<DeployRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = parse_profile(request.profile.as_deref())?;
    let workspace_id = workspace_of_version(&state, version_id).await?;
    let view_name = request.view_name;

    let service = Arc::clone(&state.service);
    let task_id = state
        .runner
        .submit(
            workspace_id,
            "deploy",
            Box::new(move |cancel| {
                Box::pin(async move {
                    let report = service
                        .deploy_version(version_id, profile, &view_name, &cancel)
                        .await?;
                    serde_json::to_value(&report).map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))
                })
            }),
        )
        .await;
    Ok(Json(json!({"task_id": task_id})))
}

pub async fn get_bundle(
    Extension(state): Extension<Arc<AppState>>,
    Path(artifact_hash): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bundle = state.service.get_bundle(&artifact_hash).await?;
    Ok(Json(serde_json::to_value(bundle).map_err(internal)?))
}
