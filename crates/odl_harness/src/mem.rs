//! In-memory implementations of the storage ports.
//!
//! One shared state behind a mutex implements all three store traits; the
//! mutex doubles as the linearization point for version numbering, matching
//! the concurrency contract the Postgres stores provide with advisory locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use odl_core::error::{OdlError, Result};
use odl_core::ports::*;
use odl_core::types::*;

#[derive(Default)]
struct State {
    workspaces: HashMap<Uuid, Workspace>,
    ontologies: HashMap<Uuid, Ontology>,
    versions: Vec<OntologyVersion>,
    compile_runs: HashMap<Uuid, CompileRun>,
    eval_runs: Vec<EvalRun>,
    diffs: Vec<DiffRecord>,
    regression_runs: Vec<RegressionRun>,
    deployed_views: HashMap<Uuid, DeployedView>,
    drift_events: Vec<DriftEventRecord>,
}

/// All three store ports over one shared in-memory state.
#[derive(Clone, Default)]
pub struct MemStores {
    state: Arc<Mutex<State>>,
}

impl MemStores {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OntologyStore for MemStores {
    async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let workspace = Workspace {
            workspace_id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .workspaces
            .insert(workspace.workspace_id, workspace.clone());
        Ok(workspace)
    }

    async fn get_workspace(&self, workspace_id: Uuid) -> Result<Workspace> {
        self.state
            .lock()
            .unwrap()
            .workspaces
            .get(&workspace_id)
            .cloned()
            .ok_or_else(|| OdlError::NotFound(format!("workspace {workspace_id}")))
    }

    async fn create_ontology(
        &self,
        workspace_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Ontology> {
        let mut state = self.state.lock().unwrap();
        if !state.workspaces.contains_key(&workspace_id) {
            return Err(OdlError::NotFound(format!("workspace {workspace_id}")));
        }
        if state
            .ontologies
            .values()
            .any(|o| o.workspace_id == workspace_id && o.name == name)
        {
            return Err(OdlError::Conflict(format!("ontology '{name}' already exists")));
        }
        let now = Utc::now();
        let ontology = Ontology {
            ontology_id: Uuid::new_v4(),
            workspace_id,
            name: name.to_string(),
            description: description.map(String::from),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.ontologies.insert(ontology.ontology_id, ontology.clone());
        Ok(ontology)
    }

    async fn get_ontology(&self, ontology_id: Uuid) -> Result<Ontology> {
        self.state
            .lock()
            .unwrap()
            .ontologies
            .get(&ontology_id)
            .cloned()
            .ok_or_else(|| OdlError::NotFound(format!("ontology {ontology_id}")))
    }

    async fn list_ontologies(&self, workspace_id: Uuid) -> Result<Vec<Ontology>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<Ontology> = state
            .ontologies
            .values()
            .filter(|o| o.workspace_id == workspace_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn deactivate_ontology(&self, ontology_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let ontology = state
            .ontologies
            .get_mut(&ontology_id)
            .ok_or_else(|| OdlError::NotFound(format!("ontology {ontology_id}")))?;
        ontology.is_active = false;
        ontology.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_version(&self, input: NewVersion) -> Result<OntologyVersion> {
        let mut state = self.state.lock().unwrap();
        if !state.ontologies.contains_key(&input.ontology_id) {
            return Err(OdlError::NotFound(format!("ontology {}", input.ontology_id)));
        }
        if input.reject_duplicate
            && state
                .versions
                .iter()
                .any(|v| v.ontology_id == input.ontology_id && v.content_hash == input.content_hash)
        {
            return Err(OdlError::DuplicateContent(input.content_hash));
        }
        let next_number = state
            .versions
            .iter()
            .filter(|v| v.ontology_id == input.ontology_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let version = OntologyVersion {
            version_id: Uuid::new_v4(),
            ontology_id: input.ontology_id,
            version_number: next_number,
            payload: input.payload,
            content_hash: input.content_hash,
            author: input.author,
            notes: input.notes,
            created_at: Utc::now(),
        };
        state.versions.push(version.clone());
        Ok(version)
    }

    async fn get_version(&self, ontology_id: Uuid, version_number: i32) -> Result<OntologyVersion> {
        self.state
            .lock()
            .unwrap()
            .versions
            .iter()
            .find(|v| v.ontology_id == ontology_id && v.version_number == version_number)
            .cloned()
            .ok_or_else(|| {
                OdlError::NotFound(format!("version {version_number} of ontology {ontology_id}"))
            })
    }

    async fn get_version_by_id(&self, version_id: Uuid) -> Result<OntologyVersion> {
        self.state
            .lock()
            .unwrap()
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
            .ok_or_else(|| OdlError::NotFound(format!("version {version_id}")))
    }

    async fn list_versions(&self, ontology_id: Uuid) -> Result<Vec<OntologyVersion>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<OntologyVersion> = state
            .versions
            .iter()
            .filter(|v| v.ontology_id == ontology_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(out)
    }

    async fn latest_version(&self, ontology_id: Uuid) -> Result<Option<OntologyVersion>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .versions
            .iter()
            .filter(|v| v.ontology_id == ontology_id)
            .max_by_key(|v| v.version_number)
            .cloned())
    }
}

#[async_trait]
impl RunStore for MemStores {
    async fn insert_compile_run(&self, run: &CompileRun) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .compile_runs
            .insert(run.run_id, run.clone());
        Ok(())
    }

    async fn mark_compile_run_running(&self, run_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .compile_runs
            .get_mut(&run_id)
            .ok_or_else(|| OdlError::NotFound(format!("compile run {run_id}")))?;
        run.status = RunStatus::Running;
        Ok(())
    }

    async fn complete_compile_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        artifact_hash: Option<String>,
        error: Option<String>,
        rollback_unavailable: bool,
        completed_at: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let run = state
            .compile_runs
            .get_mut(&run_id)
            .ok_or_else(|| OdlError::NotFound(format!("compile run {run_id}")))?;
        if run.status.is_terminal() {
            return Err(OdlError::Conflict(format!(
                "compile run {run_id} is already terminal ({})",
                run.status
            )));
        }
        run.status = status;
        run.artifact_hash = artifact_hash;
        run.error = error;
        run.rollback_unavailable = rollback_unavailable;
        run.completed_at = Some(completed_at);
        Ok(())
    }

    async fn get_compile_run(&self, run_id: Uuid) -> Result<CompileRun> {
        self.state
            .lock()
            .unwrap()
            .compile_runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| OdlError::NotFound(format!("compile run {run_id}")))
    }

    async fn list_compile_runs(&self, version_id: Uuid) -> Result<Vec<CompileRun>> {
        let state = self.state.lock().unwrap();
        let mut out: Vec<CompileRun> = state
            .compile_runs
            .values()
            .filter(|r| r.version_id == version_id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.started_at);
        Ok(out)
    }

    async fn insert_eval_run(&self, run: &EvalRun) -> Result<()> {
        self.state.lock().unwrap().eval_runs.push(run.clone());
        Ok(())
    }

    async fn list_eval_runs(&self, version_id: Uuid) -> Result<Vec<EvalRun>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .eval_runs
            .iter()
            .filter(|r| r.version_id == version_id)
            .cloned()
            .collect())
    }

    async fn insert_diff(&self, record: &DiffRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let exists = state.diffs.iter().any(|d| {
            d.old_version_id == record.old_version_id && d.new_version_id == record.new_version_id
        });
        if !exists {
            state.diffs.push(record.clone());
        }
        Ok(())
    }

    async fn get_diff(
        &self,
        old_version_id: Uuid,
        new_version_id: Uuid,
    ) -> Result<Option<DiffRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .diffs
            .iter()
            .find(|d| d.old_version_id == old_version_id && d.new_version_id == new_version_id)
            .cloned())
    }

    async fn insert_regression_run(&self, run: &RegressionRun) -> Result<()> {
        self.state.lock().unwrap().regression_runs.push(run.clone());
        Ok(())
    }

    async fn list_regression_runs(&self, version_id: Uuid) -> Result<Vec<RegressionRun>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .regression_runs
            .iter()
            .filter(|r| r.version_id == version_id)
            .cloned()
            .collect())
    }

    async fn record_deployed_view(&self, view: &DeployedView) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .deployed_views
            .insert(view.ontology_id, view.clone());
        Ok(())
    }

    async fn get_deployed_view(&self, ontology_id: Uuid) -> Result<Option<DeployedView>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deployed_views
            .get(&ontology_id)
            .cloned())
    }
}

#[async_trait]
impl DriftStore for MemStores {
    async fn insert_event_dedup(&self, event: NewDriftEvent) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let coalesced = state
            .drift_events
            .iter()
            .any(|e| e.dedup_hash == event.dedup_hash && e.status == DriftStatus::Open);
        if coalesced {
            return Ok(false);
        }
        let now = Utc::now();
        state.drift_events.push(DriftEventRecord {
            event_id: Uuid::new_v4(),
            ontology_id: event.ontology_id,
            event_type: event.event_type,
            details: event.details,
            dedup_hash: event.dedup_hash,
            status: DriftStatus::Open,
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    async fn list_events(
        &self,
        ontology_id: Uuid,
        status: Option<DriftStatus>,
    ) -> Result<Vec<DriftEventRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .drift_events
            .iter()
            .filter(|e| e.ontology_id == ontology_id)
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }

    async fn update_event_status(&self, event_id: Uuid, status: DriftStatus) -> Result<()> {
        if status == DriftStatus::Open {
            return Err(OdlError::Conflict("cannot reopen a drift event".into()));
        }
        let mut state = self.state.lock().unwrap();
        let event = state
            .drift_events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or_else(|| OdlError::NotFound(format!("drift event {event_id}")))?;
        if event.status != DriftStatus::Open {
            return Err(OdlError::Conflict(format!(
                "drift event {event_id} is not OPEN"
            )));
        }
        event.status = status;
        event.updated_at = Utc::now();
        Ok(())
    }
}
