//! sqlx row structs and conversions into core types.
//!
//! Status columns come back as text and are parsed through the core enums so
//! an unexpected value fails loudly instead of deserializing garbage.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use odl_core::types::*;

#[derive(Debug, FromRow)]
pub struct PgWorkspaceRow {
    pub workspace_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<PgWorkspaceRow> for Workspace {
    fn from(row: PgWorkspaceRow) -> Self {
        Self {
            workspace_id: row.workspace_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgOntologyRow {
    pub ontology_id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PgOntologyRow> for Ontology {
    fn from(row: PgOntologyRow) -> Self {
        Self {
            ontology_id: row.ontology_id,
            workspace_id: row.workspace_id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgVersionRow {
    pub version_id: Uuid,
    pub ontology_id: Uuid,
    pub version_number: i32,
    pub payload: String,
    pub content_hash: String,
    pub author: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PgVersionRow> for OntologyVersion {
    fn from(row: PgVersionRow) -> Self {
        Self {
            version_id: row.version_id,
            ontology_id: row.ontology_id,
            version_number: row.version_number,
            payload: row.payload,
            content_hash: row.content_hash,
            author: row.author,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgCompileRunRow {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub target: String,
    pub options: serde_json::Value,
    pub status: String,
    pub artifact_hash: Option<String>,
    pub error: Option<String>,
    pub rollback_unavailable: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PgCompileRunRow> for CompileRun {
    type Error = String;

    fn try_from(row: PgCompileRunRow) -> Result<Self, String> {
        let status = RunStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown compile run status '{}'", row.status))?;
        Ok(Self {
            run_id: row.run_id,
            version_id: row.version_id,
            target: row.target,
            options: row.options,
            status,
            artifact_hash: row.artifact_hash,
            error: row.error,
            rollback_unavailable: row.rollback_unavailable,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PgEvalRunRow {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub profile: String,
    pub metrics: serde_json::Value,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PgEvalRunRow> for EvalRun {
    fn from(row: PgEvalRunRow) -> Self {
        Self {
            run_id: row.run_id,
            version_id: row.version_id,
            profile: row.profile,
            metrics: row.metrics,
            passed: row.passed,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgDiffRow {
    pub diff_id: Uuid,
    pub ontology_id: Uuid,
    pub old_version_id: Uuid,
    pub new_version_id: Uuid,
    pub diff: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<PgDiffRow> for DiffRecord {
    fn from(row: PgDiffRow) -> Self {
        Self {
            diff_id: row.diff_id,
            ontology_id: row.ontology_id,
            old_version_id: row.old_version_id,
            new_version_id: row.new_version_id,
            diff: row.diff,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgRegressionRunRow {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub view_fqn: String,
    pub question_count: i32,
    pub passed_count: i32,
    pub failed_count: i32,
    pub overall_pass: bool,
    pub total_latency_ms: i64,
    pub results: serde_json::Value,
    pub junit_xml: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PgRegressionRunRow> for RegressionRun {
    fn from(row: PgRegressionRunRow) -> Self {
        Self {
            run_id: row.run_id,
            version_id: row.version_id,
            view_fqn: row.view_fqn,
            question_count: row.question_count.max(0) as usize,
            passed_count: row.passed_count.max(0) as usize,
            failed_count: row.failed_count.max(0) as usize,
            overall_pass: row.overall_pass,
            total_latency_ms: row.total_latency_ms.max(0) as u64,
            results: row.results,
            junit_xml: row.junit_xml,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgDeployedViewRow {
    pub deployed_view_id: Uuid,
    pub ontology_id: Uuid,
    pub version_id: Uuid,
    pub view_fqn: String,
    pub deployed_at: DateTime<Utc>,
}

impl From<PgDeployedViewRow> for DeployedView {
    fn from(row: PgDeployedViewRow) -> Self {
        Self {
            deployed_view_id: row.deployed_view_id,
            ontology_id: row.ontology_id,
            version_id: row.version_id,
            view_fqn: row.view_fqn,
            deployed_at: row.deployed_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PgDriftEventRow {
    pub event_id: Uuid,
    pub ontology_id: Uuid,
    pub event_type: String,
    pub details: serde_json::Value,
    pub dedup_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PgDriftEventRow> for DriftEventRecord {
    type Error = String;

    fn try_from(row: PgDriftEventRow) -> Result<Self, String> {
        let event_type = DriftEventType::parse(&row.event_type)
            .ok_or_else(|| format!("unknown drift event type '{}'", row.event_type))?;
        let status = DriftStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown drift status '{}'", row.status))?;
        Ok(Self {
            event_id: row.event_id,
            ontology_id: row.ontology_id,
            event_type,
            details: row.details,
            dedup_hash: row.dedup_hash,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
