//! Postgres implementations of the odl_core storage ports.
//!
//! Each store is a newtype over `PgPool`. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid a compile-time DB requirement.
//! Version numbering is linearized with a per-ontology advisory transaction
//! lock; drift dedup rides the partial unique index on open events.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use odl_core::error::{OdlError, Result};
use odl_core::ports::*;
use odl_core::types::*;

use crate::rows::*;

fn internal(e: impl std::fmt::Display) -> OdlError {
    OdlError::Internal(anyhow!("{e}"))
}

// ── PgOntologyStore ────────────────────────────────────────────

pub struct PgOntologyStore {
    pool: PgPool,
}

impl PgOntologyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VERSION_COLUMNS: &str =
    "version_id, ontology_id, version_number, payload, content_hash, author, notes, created_at";

#[async_trait]
impl OntologyStore for PgOntologyStore {
    async fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let row = sqlx::query_as::<_, PgWorkspaceRow>(
            "INSERT INTO workspace (name) VALUES ($1)
             RETURNING workspace_id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.into())
    }

    async fn get_workspace(&self, workspace_id: Uuid) -> Result<Workspace> {
        sqlx::query_as::<_, PgWorkspaceRow>(
            "SELECT workspace_id, name, created_at FROM workspace WHERE workspace_id = $1",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .map(Into::into)
        .ok_or_else(|| OdlError::NotFound(format!("workspace {workspace_id}")))
    }

    async fn create_ontology(
        &self,
        workspace_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Ontology> {
        let result = sqlx::query_as::<_, PgOntologyRow>(
            "INSERT INTO ontology (workspace_id, name, description)
             VALUES ($1, $2, $3)
             RETURNING ontology_id, workspace_id, name, description, is_active,
                       created_at, updated_at",
        )
        .bind(workspace_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(OdlError::Conflict(
                format!("ontology '{name}' already exists in workspace {workspace_id}"),
            )),
            Err(e) => Err(internal(e)),
        }
    }

    async fn get_ontology(&self, ontology_id: Uuid) -> Result<Ontology> {
        sqlx::query_as::<_, PgOntologyRow>(
            "SELECT ontology_id, workspace_id, name, description, is_active,
                    created_at, updated_at
             FROM ontology WHERE ontology_id = $1",
        )
        .bind(ontology_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .map(Into::into)
        .ok_or_else(|| OdlError::NotFound(format!("ontology {ontology_id}")))
    }

    async fn list_ontologies(&self, workspace_id: Uuid) -> Result<Vec<Ontology>> {
        let rows = sqlx::query_as::<_, PgOntologyRow>(
            "SELECT ontology_id, workspace_id, name, description, is_active,
                    created_at, updated_at
             FROM ontology WHERE workspace_id = $1
             ORDER BY name",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn deactivate_ontology(&self, ontology_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ontology SET is_active = FALSE, updated_at = now()
             WHERE ontology_id = $1",
        )
        .bind(ontology_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(OdlError::NotFound(format!("ontology {ontology_id}")));
        }
        Ok(())
    }

    async fn insert_version(&self, input: NewVersion) -> Result<OntologyVersion> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        // Serialize concurrent inserts for this ontology.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text)::bigint)")
            .bind(input.ontology_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        if input.reject_duplicate {
            let exists: Option<i32> = sqlx::query_scalar(
                "SELECT 1 FROM ontology_version
                 WHERE ontology_id = $1 AND content_hash = $2
                 LIMIT 1",
            )
            .bind(input.ontology_id)
            .bind(&input.content_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;
            if exists.is_some() {
                return Err(OdlError::DuplicateContent(input.content_hash));
            }
        }

        let next_number: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1
             FROM ontology_version WHERE ontology_id = $1",
        )
        .bind(input.ontology_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal)?;

        let row = sqlx::query_as::<_, PgVersionRow>(&format!(
            "INSERT INTO ontology_version
                 (ontology_id, version_number, payload, content_hash, author, notes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {VERSION_COLUMNS}"
        ))
        .bind(input.ontology_id)
        .bind(next_number)
        .bind(&input.payload)
        .bind(&input.content_hash)
        .bind(&input.author)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)?;
        Ok(row.into())
    }

    async fn get_version(&self, ontology_id: Uuid, version_number: i32) -> Result<OntologyVersion> {
        sqlx::query_as::<_, PgVersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ontology_version
             WHERE ontology_id = $1 AND version_number = $2"
        ))
        .bind(ontology_id)
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .map(Into::into)
        .ok_or_else(|| {
            OdlError::NotFound(format!("version {version_number} of ontology {ontology_id}"))
        })
    }

    async fn get_version_by_id(&self, version_id: Uuid) -> Result<OntologyVersion> {
        sqlx::query_as::<_, PgVersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ontology_version WHERE version_id = $1"
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .map(Into::into)
        .ok_or_else(|| OdlError::NotFound(format!("version {version_id}")))
    }

    async fn list_versions(&self, ontology_id: Uuid) -> Result<Vec<OntologyVersion>> {
        let rows = sqlx::query_as::<_, PgVersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ontology_version
             WHERE ontology_id = $1
             ORDER BY created_at DESC, version_number DESC"
        ))
        .bind(ontology_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_version(&self, ontology_id: Uuid) -> Result<Option<OntologyVersion>> {
        let row = sqlx::query_as::<_, PgVersionRow>(&format!(
            "SELECT {VERSION_COLUMNS} FROM ontology_version
             WHERE ontology_id = $1
             ORDER BY version_number DESC
             LIMIT 1"
        ))
        .bind(ontology_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }
}

// ── PgRunStore ─────────────────────────────────────────────────

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const COMPILE_RUN_COLUMNS: &str = "run_id, version_id, target, options, status, artifact_hash, \
                                   error, rollback_unavailable, started_at, completed_at";

#[async_trait]
impl RunStore for PgRunStore {
    async fn insert_compile_run(&self, run: &CompileRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO compile_run
                 (run_id, version_id, target, options, status, rollback_unavailable, started_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(run.run_id)
        .bind(run.version_id)
        .bind(&run.target)
        .bind(&run.options)
        .bind(run.status.as_str())
        .bind(run.rollback_unavailable)
        .bind(run.started_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn mark_compile_run_running(&self, run_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE compile_run SET status = 'RUNNING'
             WHERE run_id = $1 AND status = 'PENDING'",
        )
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(OdlError::Conflict(format!(
                "compile run {run_id} is not PENDING"
            )));
        }
        Ok(())
    }

    async fn complete_compile_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        artifact_hash: Option<String>,
        error: Option<String>,
        rollback_unavailable: bool,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        // Terminal rows never transition again.
        let result = sqlx::query(
            "UPDATE compile_run
             SET status = $2, artifact_hash = $3, error = $4,
                 rollback_unavailable = $5, completed_at = $6
             WHERE run_id = $1 AND status IN ('PENDING', 'RUNNING')",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(artifact_hash)
        .bind(error)
        .bind(rollback_unavailable)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(OdlError::Conflict(format!(
                "compile run {run_id} is already terminal"
            )));
        }
        Ok(())
    }

    async fn get_compile_run(&self, run_id: Uuid) -> Result<CompileRun> {
        let row = sqlx::query_as::<_, PgCompileRunRow>(&format!(
            "SELECT {COMPILE_RUN_COLUMNS} FROM compile_run WHERE run_id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| OdlError::NotFound(format!("compile run {run_id}")))?;
        row.try_into().map_err(internal)
    }

    async fn list_compile_runs(&self, version_id: Uuid) -> Result<Vec<CompileRun>> {
        let rows = sqlx::query_as::<_, PgCompileRunRow>(&format!(
            "SELECT {COMPILE_RUN_COLUMNS} FROM compile_run
             WHERE version_id = $1 ORDER BY started_at"
        ))
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter()
            .map(|r| r.try_into().map_err(internal))
            .collect()
    }

    async fn insert_eval_run(&self, run: &EvalRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO eval_run
                 (run_id, version_id, profile, metrics, passed, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(run.run_id)
        .bind(run.version_id)
        .bind(&run.profile)
        .bind(&run.metrics)
        .bind(run.passed)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn list_eval_runs(&self, version_id: Uuid) -> Result<Vec<EvalRun>> {
        let rows = sqlx::query_as::<_, PgEvalRunRow>(
            "SELECT run_id, version_id, profile, metrics, passed, started_at, completed_at
             FROM eval_run WHERE version_id = $1 ORDER BY started_at",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_diff(&self, record: &DiffRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO ontology_diff
                 (diff_id, ontology_id, old_version_id, new_version_id, diff, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (old_version_id, new_version_id) DO NOTHING",
        )
        .bind(record.diff_id)
        .bind(record.ontology_id)
        .bind(record.old_version_id)
        .bind(record.new_version_id)
        .bind(&record.diff)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_diff(
        &self,
        old_version_id: Uuid,
        new_version_id: Uuid,
    ) -> Result<Option<DiffRecord>> {
        let row = sqlx::query_as::<_, PgDiffRow>(
            "SELECT diff_id, ontology_id, old_version_id, new_version_id, diff, created_at
             FROM ontology_diff
             WHERE old_version_id = $1 AND new_version_id = $2",
        )
        .bind(old_version_id)
        .bind(new_version_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }

    async fn insert_regression_run(&self, run: &RegressionRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO regression_run
                 (run_id, version_id, view_fqn, question_count, passed_count, failed_count,
                  overall_pass, total_latency_ms, results, junit_xml, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(run.run_id)
        .bind(run.version_id)
        .bind(&run.view_fqn)
        .bind(run.question_count as i32)
        .bind(run.passed_count as i32)
        .bind(run.failed_count as i32)
        .bind(run.overall_pass)
        .bind(run.total_latency_ms as i64)
        .bind(&run.results)
        .bind(&run.junit_xml)
        .bind(run.started_at)
        .bind(run.completed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn list_regression_runs(&self, version_id: Uuid) -> Result<Vec<RegressionRun>> {
        let rows = sqlx::query_as::<_, PgRegressionRunRow>(
            "SELECT run_id, version_id, view_fqn, question_count, passed_count, failed_count,
                    overall_pass, total_latency_ms, results, junit_xml, started_at, completed_at
             FROM regression_run WHERE version_id = $1 ORDER BY started_at",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_deployed_view(&self, view: &DeployedView) -> Result<()> {
        sqlx::query(
            "INSERT INTO deployed_view
                 (deployed_view_id, ontology_id, version_id, view_fqn, deployed_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (ontology_id) DO UPDATE
             SET version_id = EXCLUDED.version_id,
                 view_fqn = EXCLUDED.view_fqn,
                 deployed_at = EXCLUDED.deployed_at",
        )
        .bind(view.deployed_view_id)
        .bind(view.ontology_id)
        .bind(view.version_id)
        .bind(&view.view_fqn)
        .bind(view.deployed_at)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_deployed_view(&self, ontology_id: Uuid) -> Result<Option<DeployedView>> {
        let row = sqlx::query_as::<_, PgDeployedViewRow>(
            "SELECT deployed_view_id, ontology_id, version_id, view_fqn, deployed_at
             FROM deployed_view WHERE ontology_id = $1",
        )
        .bind(ontology_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;
        Ok(row.map(Into::into))
    }
}

// ── PgDriftStore ───────────────────────────────────────────────

pub struct PgDriftStore {
    pool: PgPool,
}

impl PgDriftStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftStore for PgDriftStore {
    async fn insert_event_dedup(&self, event: NewDriftEvent) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO drift_event (ontology_id, event_type, details, dedup_hash)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (dedup_hash) WHERE status = 'OPEN' DO NOTHING",
        )
        .bind(event.ontology_id)
        .bind(event.event_type.as_str())
        .bind(&event.details)
        .bind(&event.dedup_hash)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        let created = result.rows_affected() == 1;
        if !created {
            tracing::debug!(dedup = %event.dedup_hash, "drift event coalesced");
        }
        Ok(created)
    }

    async fn list_events(
        &self,
        ontology_id: Uuid,
        status: Option<DriftStatus>,
    ) -> Result<Vec<DriftEventRecord>> {
        let rows = sqlx::query_as::<_, PgDriftEventRow>(
            "SELECT event_id, ontology_id, event_type, details, dedup_hash, status,
                    created_at, updated_at
             FROM drift_event
             WHERE ontology_id = $1
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at",
        )
        .bind(ontology_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;
        rows.into_iter()
            .map(|r| r.try_into().map_err(internal))
            .collect()
    }

    async fn update_event_status(&self, event_id: Uuid, status: DriftStatus) -> Result<()> {
        if status == DriftStatus::Open {
            return Err(OdlError::Conflict("cannot reopen a drift event".into()));
        }
        let result = sqlx::query(
            "UPDATE drift_event SET status = $2, updated_at = now()
             WHERE event_id = $1 AND status = 'OPEN'",
        )
        .bind(event_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(OdlError::Conflict(format!(
                "drift event {event_id} not found or not OPEN"
            )));
        }
        Ok(())
    }
}
