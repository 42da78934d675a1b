//! Lifecycle service — the facade every caller (server handlers, task
//! runner) goes through.
//!
//! Wires the storage ports and the warehouse adapter into the pipeline:
//! create_version runs validate → normalize → hash → insert; compile is
//! gate-bound; deploy captures rollback state; drift findings are
//! deduplicated on insert. Input errors never create RUNNING rows.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::compile::{self, ArtifactBundle, CompileOptions, CompileSource};
use crate::config::EngineConfig;
use crate::deploy::{DeployReport, DeployTarget, Deployer};
use crate::diff::{self, OntologyDiff};
use crate::drift::{self, DriftDetector};
use crate::error::{OdlError, Result};
use crate::evaluate::{self, EvaluationOutcome, ThresholdProfile};
use crate::ir::OntologyIr;
use crate::normalize;
use crate::ports::*;
use crate::regression::{QuestionSet, RegressionRunner};
use crate::runner::CancelFlag;
use crate::types::*;

pub struct LifecycleService {
    config: EngineConfig,
    ontologies: Arc<dyn OntologyStore>,
    runs: Arc<dyn RunStore>,
    drift_store: Arc<dyn DriftStore>,
    warehouse: Arc<dyn WarehouseAdapter>,
    /// Compiled bundles by content hash. The blob store proper is an
    /// external collaborator; runs carry the hash as their artifact pointer.
    bundles: Mutex<HashMap<String, ArtifactBundle>>,
}

/// Outcome summary for one drift-detection pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DriftDetectionSummary {
    pub ontology_id: Uuid,
    pub findings: usize,
    pub created: usize,
    pub coalesced: usize,
    pub has_drift: bool,
    /// `DRIFT_DETECTED` when any finding surfaced; absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl LifecycleService {
    pub fn new(
        config: EngineConfig,
        ontologies: Arc<dyn OntologyStore>,
        runs: Arc<dyn RunStore>,
        drift_store: Arc<dyn DriftStore>,
        warehouse: Arc<dyn WarehouseAdapter>,
    ) -> Self {
        Self {
            config,
            ontologies,
            runs,
            drift_store,
            warehouse,
            bundles: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Workspaces & ontologies ────────────────────────────────

    pub async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        self.ontologies.create_workspace(name).await
    }

    pub async fn get_workspace(&self, workspace_id: Uuid) -> Result<Workspace> {
        self.ontologies.get_workspace(workspace_id).await
    }

    pub async fn create_ontology(
        &self,
        workspace_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Ontology> {
        self.ontologies
            .create_ontology(workspace_id, name, description)
            .await
    }

    pub async fn get_ontology(&self, ontology_id: Uuid) -> Result<Ontology> {
        self.ontologies.get_ontology(ontology_id).await
    }

    pub async fn list_ontologies(&self, workspace_id: Uuid) -> Result<Vec<Ontology>> {
        self.ontologies.list_ontologies(workspace_id).await
    }

    pub async fn deactivate_ontology(&self, ontology_id: Uuid) -> Result<()> {
        self.ontologies.deactivate_ontology(ontology_id).await
    }

    // ── Versions ───────────────────────────────────────────────

    /// Validate, normalize, hash, and insert a new version.
    pub async fn create_version(
        &self,
        ontology_id: Uuid,
        odl_json: &str,
        author: Option<&str>,
        notes: Option<&str>,
    ) -> Result<OntologyVersion> {
        let ontology = self.ontologies.get_ontology(ontology_id).await?;
        if !ontology.is_active {
            return Err(OdlError::Conflict(format!(
                "ontology '{}' is not active",
                ontology.name
            )));
        }
        let processed = normalize::process(odl_json)?;
        let version = self
            .ontologies
            .insert_version(NewVersion {
                ontology_id,
                payload: processed.canonical,
                content_hash: processed.content_hash,
                author: author.map(String::from),
                notes: notes.map(String::from),
                reject_duplicate: self.config.reject_duplicate_content,
            })
            .await?;
        tracing::info!(
            ontology = %ontology.name,
            version = version.version_number,
            hash = %version.content_hash,
            "version created"
        );
        Ok(version)
    }

    pub async fn get_version(&self, ontology_id: Uuid, number: i32) -> Result<OntologyVersion> {
        self.ontologies.get_version(ontology_id, number).await
    }

    pub async fn list_versions(&self, ontology_id: Uuid) -> Result<Vec<OntologyVersion>> {
        self.ontologies.list_versions(ontology_id).await
    }

    pub async fn latest_version(&self, ontology_id: Uuid) -> Result<Option<OntologyVersion>> {
        self.ontologies.latest_version(ontology_id).await
    }

    pub async fn version_by_id(&self, version_id: Uuid) -> Result<OntologyVersion> {
        self.ontologies.get_version_by_id(version_id).await
    }

    fn ir_of(&self, version: &OntologyVersion) -> Result<OntologyIr> {
        Ok(normalize::process(&version.payload)?.ir)
    }

    // ── Diff ───────────────────────────────────────────────────

    /// Diff two versions of one ontology, returning the persisted record
    /// when it exists (diffs are immutable once computed).
    pub async fn diff_versions(
        &self,
        ontology_id: Uuid,
        old_number: i32,
        new_number: i32,
    ) -> Result<OntologyDiff> {
        let old = self.ontologies.get_version(ontology_id, old_number).await?;
        let new = self.ontologies.get_version(ontology_id, new_number).await?;

        if let Some(record) = self.runs.get_diff(old.version_id, new.version_id).await? {
            return serde_json::from_value(record.diff)
                .map_err(|e| OdlError::Internal(anyhow::anyhow!("stored diff unreadable: {e}")));
        }

        let result = diff::diff(&self.ir_of(&old)?, &self.ir_of(&new)?);
        let record = DiffRecord {
            diff_id: Uuid::new_v4(),
            ontology_id,
            old_version_id: old.version_id,
            new_version_id: new.version_id,
            diff: serde_json::to_value(&result)
                .map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))?,
            created_at: Utc::now(),
        };
        self.runs.insert_diff(&record).await?;
        Ok(result)
    }

    // ── Evaluation ─────────────────────────────────────────────

    pub async fn evaluate_version(
        &self,
        version_id: Uuid,
        profile: ThresholdProfile,
        cancel: &CancelFlag,
    ) -> Result<EvaluationOutcome> {
        let version = self.ontologies.get_version_by_id(version_id).await?;
        let ir = self.ir_of(&version)?;
        let started_at = Utc::now();
        cancel.checkpoint()?;
        let outcome = evaluate::evaluate(&ir, profile);
        cancel.checkpoint()?;
        let run = EvalRun {
            run_id: Uuid::new_v4(),
            version_id,
            profile: profile.as_str().to_string(),
            metrics: serde_json::to_value(&outcome.metrics)
                .map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))?,
            passed: outcome.passed,
            started_at,
            completed_at: Some(Utc::now()),
        };
        self.runs.insert_eval_run(&run).await?;
        Ok(outcome)
    }

    // ── Compile ────────────────────────────────────────────────

    /// Gate-bound compile. The version must pass the chosen profile before
    /// any run row is written; gate rejection is an input error.
    pub async fn compile_version(
        &self,
        version_id: Uuid,
        profile: ThresholdProfile,
        options: CompileOptions,
        cancel: &CancelFlag,
    ) -> Result<CompileRun> {
        let (mut run, _bundle) = self
            .compile_to_bundle(version_id, profile, options, cancel)
            .await?;
        let artifact_hash = run.artifact_hash.clone();
        let completed_at = Utc::now();
        self.runs
            .complete_compile_run(
                run.run_id,
                RunStatus::Success,
                artifact_hash,
                None,
                false,
                completed_at,
            )
            .await?;
        run.status = RunStatus::Success;
        run.completed_at = Some(completed_at);
        Ok(run)
    }

    /// Shared compile front half: gates, run row (left RUNNING), bundle.
    /// The caller finalizes the run exactly once.
    async fn compile_to_bundle(
        &self,
        version_id: Uuid,
        profile: ThresholdProfile,
        mut options: CompileOptions,
        cancel: &CancelFlag,
    ) -> Result<(CompileRun, ArtifactBundle)> {
        let version = self.ontologies.get_version_by_id(version_id).await?;
        let ontology = self.ontologies.get_ontology(version.ontology_id).await?;
        let ir = self.ir_of(&version)?;

        let gate_outcome = evaluate::evaluate(&ir, profile);
        if !gate_outcome.passed {
            let failure = gate_outcome
                .first_failure
                .map(|f| format!("{} [{}]: {}", f.gate, f.category.as_str(), f.message))
                .unwrap_or_else(|| "gate evaluation failed".to_string());
            return Err(OdlError::GateFailed(failure));
        }

        cancel.checkpoint()?;
        options.compiled_at = Utc::now();

        let mut run = CompileRun {
            run_id: Uuid::new_v4(),
            version_id,
            target: compile::TARGET.to_string(),
            options: serde_json::to_value(&options)
                .map_err(|e| OdlError::Internal(anyhow::anyhow!(e)))?,
            status: RunStatus::Pending,
            artifact_hash: None,
            error: None,
            rollback_unavailable: false,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.runs.insert_compile_run(&run).await?;
        self.runs.mark_compile_run_running(run.run_id).await?;
        run.status = RunStatus::Running;

        let source = CompileSource {
            ontology_name: ontology.name.clone(),
            version_number: version.version_number,
            content_hash: version.content_hash.clone(),
        };
        match compile::compile(&ir, &source, &options) {
            Ok(bundle) => {
                let artifact_hash = bundle.content_hash.clone();
                self.bundles
                    .lock()
                    .await
                    .insert(artifact_hash.clone(), bundle.clone());
                run.artifact_hash = Some(artifact_hash);
                Ok((run, bundle))
            }
            Err(err) => {
                self.runs
                    .complete_compile_run(
                        run.run_id,
                        RunStatus::Failed,
                        None,
                        Some(err.to_string()),
                        false,
                        Utc::now(),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    pub async fn get_bundle(&self, artifact_hash: &str) -> Result<ArtifactBundle> {
        self.bundles
            .lock()
            .await
            .get(artifact_hash)
            .cloned()
            .ok_or_else(|| OdlError::NotFound(format!("bundle {artifact_hash}")))
    }

    // ── Deploy ─────────────────────────────────────────────────

    /// Compile (gate-bound) then verify and deploy. The compile run is the
    /// record of the whole attempt: verify/deploy failures flip it to
    /// FAILED with the error text; rollback capture state lands on it too.
    pub async fn deploy_version(
        &self,
        version_id: Uuid,
        profile: ThresholdProfile,
        view_name: &str,
        cancel: &CancelFlag,
    ) -> Result<DeployReport> {
        let version = self.ontologies.get_version_by_id(version_id).await?;
        let ir = self.ir_of(&version)?;
        let target_mapping = ir
            .target_mapping
            .as_ref()
            .ok_or_else(|| OdlError::DeployFailed("version declares no target mapping".into()))?;
        let target = DeployTarget {
            database: target_mapping.database.clone(),
            schema: target_mapping.schema.clone(),
            view_name: view_name.to_string(),
        };

        let options = CompileOptions::single(view_name, Utc::now());
        let (run, mut bundle) = self
            .compile_to_bundle(version_id, profile, options, cancel)
            .await?;
        let artifact_hash = run
            .artifact_hash
            .clone()
            .ok_or_else(|| OdlError::CompileFailed("compile run has no artifact".into()))?;

        cancel.checkpoint()?;

        let deployer = Deployer::new(Arc::clone(&self.warehouse), self.config.clone());
        match deployer.deploy_bundle(&mut bundle, &target, cancel).await {
            Ok(report) => {
                // Keep the mutated bundle (captured rollback model) addressable.
                self.bundles
                    .lock()
                    .await
                    .insert(artifact_hash.clone(), bundle);
                self.runs
                    .complete_compile_run(
                        run.run_id,
                        RunStatus::Success,
                        Some(artifact_hash),
                        None,
                        !report.rollback_captured,
                        Utc::now(),
                    )
                    .await?;
                self.runs
                    .record_deployed_view(&DeployedView {
                        deployed_view_id: Uuid::new_v4(),
                        ontology_id: version.ontology_id,
                        version_id,
                        view_fqn: report.view_fqn.clone(),
                        deployed_at: Utc::now(),
                    })
                    .await?;
                Ok(report)
            }
            Err(err) => {
                self.runs
                    .complete_compile_run(
                        run.run_id,
                        RunStatus::Failed,
                        Some(artifact_hash),
                        Some(err.to_string()),
                        false,
                        Utc::now(),
                    )
                    .await?;
                Err(err)
            }
        }
    }

    // ── Drift ──────────────────────────────────────────────────

    /// Run both drift probes and persist deduplicated OPEN events.
    pub async fn detect_drift(
        &self,
        ontology_id: Uuid,
        cancel: &CancelFlag,
    ) -> Result<DriftDetectionSummary> {
        let ontology = self.ontologies.get_ontology(ontology_id).await?;
        if !ontology.is_active {
            return Err(OdlError::Conflict(format!(
                "ontology '{}' is not active",
                ontology.name
            )));
        }
        let latest = self
            .ontologies
            .latest_version(ontology_id)
            .await?
            .ok_or_else(|| OdlError::NotFound(format!("ontology {ontology_id} has no versions")))?;
        let ir = self.ir_of(&latest)?;

        let detector = DriftDetector::new(Arc::clone(&self.warehouse), self.config.clone());
        let mut findings = detector.detect_mapping_drift(&ir, cancel).await?;

        cancel.checkpoint()?;

        // View drift runs against the version recorded as deployed.
        if let Some(deployed) = self.runs.get_deployed_view(ontology_id).await? {
            let deployed_version = self
                .ontologies
                .get_version_by_id(deployed.version_id)
                .await?;
            let deployed_ir = self.ir_of(&deployed_version)?;
            if let Some(tm) = deployed_ir.target_mapping.as_ref() {
                let source = CompileSource {
                    ontology_name: ontology.name.clone(),
                    version_number: deployed_version.version_number,
                    content_hash: deployed_version.content_hash.clone(),
                };
                let expected = crate::compile::semantic_yaml::render(
                    &deployed_ir,
                    &source,
                    &tm.database,
                    &tm.schema,
                )?;
                if let Some(finding) = detector
                    .detect_view_drift(&deployed.view_fqn, &expected)
                    .await?
                {
                    findings.push(finding);
                }
            }
        }

        let total = findings.len();
        let mut created = 0usize;
        for finding in findings {
            let event = NewDriftEvent {
                ontology_id,
                dedup_hash: drift::dedup_hash(ontology_id, finding.event_type, &finding.details),
                event_type: finding.event_type,
                details: finding.details,
            };
            if self.drift_store.insert_event_dedup(event).await? {
                created += 1;
            }
        }
        if total > 0 {
            tracing::warn!(%ontology_id, findings = total, created, "drift detected");
        }

        Ok(DriftDetectionSummary {
            ontology_id,
            findings: total,
            created,
            coalesced: total - created,
            has_drift: total > 0,
            code: (total > 0).then(|| "DRIFT_DETECTED".to_string()),
        })
    }

    pub async fn list_drift_events(
        &self,
        ontology_id: Uuid,
        status: Option<DriftStatus>,
    ) -> Result<Vec<DriftEventRecord>> {
        self.drift_store.list_events(ontology_id, status).await
    }

    pub async fn update_drift_event(&self, event_id: Uuid, status: DriftStatus) -> Result<()> {
        self.drift_store.update_event_status(event_id, status).await
    }

    // ── Regression ─────────────────────────────────────────────

    /// Run a question set against the ontology's deployed view. Runs against
    /// a non-deployed ontology are forbidden.
    pub async fn run_regression(
        &self,
        ontology_id: Uuid,
        set: &QuestionSet,
        cancel: &CancelFlag,
    ) -> Result<RegressionRun> {
        let deployed = self
            .runs
            .get_deployed_view(ontology_id)
            .await?
            .ok_or_else(|| {
                OdlError::RegressionFailed(format!(
                    "ontology {ontology_id} has no deployed view"
                ))
            })?;

        let started_at = Utc::now();
        let runner = RegressionRunner::new(Arc::clone(&self.warehouse), self.config.clone());
        let outcome = runner.run(&deployed.view_fqn, set, cancel).await?;

        let run = RegressionRun {
            run_id: Uuid::new_v4(),
            version_id: deployed.version_id,
            view_fqn: outcome.view_fqn.clone(),
            question_count: outcome.total_questions,
            passed_count: outcome.passed,
            failed_count: outcome.failed,
            overall_pass: outcome.overall_pass,
            total_latency_ms: outcome.total_latency_ms,
            results: json!({
                "results": outcome.results,
                "code": if outcome.overall_pass { serde_json::Value::Null } else { json!("REGRESSION_FAILED") },
            }),
            junit_xml: Some(outcome.to_junit_xml()),
            started_at,
            completed_at: Some(Utc::now()),
        };
        self.runs.insert_regression_run(&run).await?;
        Ok(run)
    }
}
