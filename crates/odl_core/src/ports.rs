//! Storage and warehouse port traits.
//!
//! Core logic depends only on these traits; `odl_postgres` implements the
//! stores, concrete warehouse adapters live outside the core (the harness
//! ships a scriptable mock). The Version Store is the sole mutator of
//! persisted records.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::*;

// ── Version store ──────────────────────────────────────────────

/// Input for a version insert. Payload and hash are produced by the
/// normalizer before this reaches the store.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub ontology_id: Uuid,
    pub payload: String,
    pub content_hash: String,
    pub author: Option<String>,
    pub notes: Option<String>,
    /// When true the insert fails with DUPLICATE_CONTENT if the ontology
    /// already has a version with this hash.
    pub reject_duplicate: bool,
}

#[async_trait]
pub trait OntologyStore: Send + Sync {
    async fn create_workspace(&self, name: &str) -> Result<Workspace>;
    async fn get_workspace(&self, workspace_id: Uuid) -> Result<Workspace>;

    async fn create_ontology(
        &self,
        workspace_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Ontology>;
    async fn get_ontology(&self, ontology_id: Uuid) -> Result<Ontology>;
    async fn list_ontologies(&self, workspace_id: Uuid) -> Result<Vec<Ontology>>;
    /// Soft delete: clears `is_active`.
    async fn deactivate_ontology(&self, ontology_id: Uuid) -> Result<()>;

    /// Allocate the next monotone version number and insert atomically.
    /// Concurrent calls for one ontology are linearized by the store.
    async fn insert_version(&self, input: NewVersion) -> Result<OntologyVersion>;
    async fn get_version(&self, ontology_id: Uuid, version_number: i32) -> Result<OntologyVersion>;
    async fn get_version_by_id(&self, version_id: Uuid) -> Result<OntologyVersion>;
    /// Descending by creation time.
    async fn list_versions(&self, ontology_id: Uuid) -> Result<Vec<OntologyVersion>>;
    async fn latest_version(&self, ontology_id: Uuid) -> Result<Option<OntologyVersion>>;
}

// ── Run store ──────────────────────────────────────────────────

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert_compile_run(&self, run: &CompileRun) -> Result<()>;
    async fn mark_compile_run_running(&self, run_id: Uuid) -> Result<()>;
    async fn complete_compile_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        artifact_hash: Option<String>,
        error: Option<String>,
        rollback_unavailable: bool,
        completed_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn get_compile_run(&self, run_id: Uuid) -> Result<CompileRun>;
    async fn list_compile_runs(&self, version_id: Uuid) -> Result<Vec<CompileRun>>;

    async fn insert_eval_run(&self, run: &EvalRun) -> Result<()>;
    async fn list_eval_runs(&self, version_id: Uuid) -> Result<Vec<EvalRun>>;

    /// Diffs are immutable; inserting an existing pair is a no-op.
    async fn insert_diff(&self, record: &DiffRecord) -> Result<()>;
    async fn get_diff(&self, old_version_id: Uuid, new_version_id: Uuid)
        -> Result<Option<DiffRecord>>;

    async fn insert_regression_run(&self, run: &RegressionRun) -> Result<()>;
    async fn list_regression_runs(&self, version_id: Uuid) -> Result<Vec<RegressionRun>>;

    async fn record_deployed_view(&self, view: &DeployedView) -> Result<()>;
    async fn get_deployed_view(&self, ontology_id: Uuid) -> Result<Option<DeployedView>>;
}

// ── Drift store ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewDriftEvent {
    pub ontology_id: Uuid,
    pub event_type: DriftEventType,
    pub details: serde_json::Value,
    pub dedup_hash: String,
}

#[async_trait]
pub trait DriftStore: Send + Sync {
    /// Insert unless an OPEN event with the same dedup hash exists.
    /// Returns false when coalesced.
    async fn insert_event_dedup(&self, event: NewDriftEvent) -> Result<bool>;
    async fn list_events(
        &self,
        ontology_id: Uuid,
        status: Option<DriftStatus>,
    ) -> Result<Vec<DriftEventRecord>>;
    /// Only OPEN → RESOLVED and OPEN → IGNORED are legal transitions.
    async fn update_event_status(&self, event_id: Uuid, status: DriftStatus) -> Result<()>;
}

// ── Warehouse adapter ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCallOutcome {
    pub ok: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystAnswer {
    pub sql: String,
    pub answer: String,
    pub latency_ms: u64,
}

/// Live catalog: table → column → raw warehouse type.
pub type Catalog = BTreeMap<String, BTreeMap<String, String>>;

/// Abstract warehouse operations. Implementations are stateless per call;
/// transport-level failures surface as `OdlError::Transport` /
/// `OdlError::Timeout`, while semantic verify/deploy rejections come back in
/// the outcome structs.
#[async_trait]
pub trait WarehouseAdapter: Send + Sync {
    async fn verify(&self, yaml: &str, database: &str, schema: &str) -> Result<VerifyOutcome>;
    async fn deploy(
        &self,
        yaml: &str,
        database: &str,
        schema: &str,
        view_name: &str,
    ) -> Result<DeployCallOutcome>;
    /// Returns None when the view does not exist.
    async fn export_existing(&self, view_fqn: &str) -> Result<Option<String>>;
    async fn list_catalog(&self, database: &str, schema: &str) -> Result<Catalog>;
    async fn ask(&self, view_fqn: &str, question: &str) -> Result<AnalystAnswer>;
}
