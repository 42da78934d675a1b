//! Persisted entity types.
//!
//! Pure value types — no sqlx, no DB dependencies. Status enums carry
//! `as_str`/`parse` pairs because the stores persist them as text columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Tenancy ────────────────────────────────────────────────────

/// Tenant boundary. Created externally, never destroyed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub workspace_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Named definition within a workspace; aggregates versions, holds no
/// content itself. Soft-deletable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
    pub ontology_id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of an ontology. Payload is the canonical ODL bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyVersion {
    pub version_id: Uuid,
    pub ontology_id: Uuid,
    pub version_number: i32,
    pub payload: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Run statuses ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Runs ───────────────────────────────────────────────────────

/// One attempt to compile a version to the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileRun {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub target: String,
    pub options: serde_json::Value,
    pub status: RunStatus,
    /// Content hash of the produced bundle (SUCCESS only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when no pre-deploy rollback model could be captured. A warning,
    /// never a failure.
    pub rollback_unavailable: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One evaluation of a version against a threshold profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRun {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub profile: String,
    /// Gate results per category, as produced by the evaluator.
    pub metrics: serde_json::Value,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted diff between two versions; immutable once computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRecord {
    pub diff_id: Uuid,
    pub ontology_id: Uuid,
    pub old_version_id: Uuid,
    pub new_version_id: Uuid,
    pub diff: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One regression pass of a question set against a deployed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionRun {
    pub run_id: Uuid,
    pub version_id: Uuid,
    pub view_fqn: String,
    pub question_count: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub overall_pass: bool,
    pub total_latency_ms: u64,
    pub results: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junit_xml: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Live-view record written after a successful deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedView {
    pub deployed_view_id: Uuid,
    pub ontology_id: Uuid,
    pub version_id: Uuid,
    pub view_fqn: String,
    pub deployed_at: DateTime<Utc>,
}

// ── Drift ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftEventType {
    ColumnRenamed,
    ColumnAdded,
    ColumnDropped,
    ColumnTypeChanged,
    TableMissing,
    YamlDiverged,
}

impl DriftEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColumnRenamed => "COLUMN_RENAMED",
            Self::ColumnAdded => "COLUMN_ADDED",
            Self::ColumnDropped => "COLUMN_DROPPED",
            Self::ColumnTypeChanged => "COLUMN_TYPE_CHANGED",
            Self::TableMissing => "TABLE_MISSING",
            Self::YamlDiverged => "YAML_DIVERGED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COLUMN_RENAMED" => Some(Self::ColumnRenamed),
            "COLUMN_ADDED" => Some(Self::ColumnAdded),
            "COLUMN_DROPPED" => Some(Self::ColumnDropped),
            "COLUMN_TYPE_CHANGED" => Some(Self::ColumnTypeChanged),
            "TABLE_MISSING" => Some(Self::TableMissing),
            "YAML_DIVERGED" => Some(Self::YamlDiverged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftStatus {
    Open,
    Resolved,
    Ignored,
}

impl DriftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
            Self::Ignored => "IGNORED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "RESOLVED" => Some(Self::Resolved),
            "IGNORED" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// An observed divergence between the declared ontology and the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEventRecord {
    pub event_id: Uuid,
    pub ontology_id: Uuid,
    pub event_type: DriftEventType,
    pub details: serde_json::Value,
    /// SHA-256 over (ontology, event_type, details) — open-event coalescing key.
    pub dedup_hash: String,
    pub status: DriftStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
