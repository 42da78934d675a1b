//! Scriptable mock warehouse adapter.
//!
//! Tests edit the simulated catalog (add / drop / rename columns), seed
//! semantic views and analyst answers, and inject transport faults to
//! exercise the retry paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use odl_core::error::{OdlError, Result};
use odl_core::ports::{
    AnalystAnswer, Catalog, DeployCallOutcome, VerifyOutcome, WarehouseAdapter,
};

#[derive(Default)]
struct MockState {
    /// (database, schema) → table → column → type.
    catalogs: HashMap<(String, String), Catalog>,
    /// view fqn → YAML.
    semantic_views: HashMap<String, String>,
    /// question → (sql, answer).
    analyst_answers: HashMap<String, (String, String)>,
    analyst_latency_ms: u64,
    verify_transport_failures: u32,
    verify_rejection: Option<String>,
    deploy_rejection: Option<String>,
    verify_calls: u32,
    deploy_calls: u32,
}

#[derive(Default)]
pub struct MockWarehouse {
    state: Mutex<MockState>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().analyst_latency_ms = 25;
        mock
    }

    // ── Catalog scripting ──────────────────────────────────────

    pub fn add_table(&self, database: &str, schema: &str, table: &str, columns: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state
            .catalogs
            .entry((database.to_string(), schema.to_string()))
            .or_default()
            .insert(
                table.to_string(),
                columns
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
            );
    }

    pub fn drop_column(&self, database: &str, schema: &str, table: &str, column: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(columns) = state
            .catalogs
            .get_mut(&(database.to_string(), schema.to_string()))
            .and_then(|c| c.get_mut(table))
        {
            columns.remove(column);
        }
    }

    pub fn add_column(&self, database: &str, schema: &str, table: &str, column: &str, ty: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(columns) = state
            .catalogs
            .get_mut(&(database.to_string(), schema.to_string()))
            .and_then(|c| c.get_mut(table))
        {
            columns.insert(column.to_string(), ty.to_string());
        }
    }

    pub fn rename_column(&self, database: &str, schema: &str, table: &str, from: &str, to: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(columns) = state
            .catalogs
            .get_mut(&(database.to_string(), schema.to_string()))
            .and_then(|c| c.get_mut(table))
        {
            if let Some(ty) = columns.remove(from) {
                columns.insert(to.to_string(), ty);
            }
        }
    }

    // ── View / analyst scripting ───────────────────────────────

    pub fn seed_semantic_view(&self, view_fqn: &str, yaml: &str) {
        self.state
            .lock()
            .unwrap()
            .semantic_views
            .insert(view_fqn.to_string(), yaml.to_string());
    }

    pub fn exported_view(&self, view_fqn: &str) -> Option<String> {
        self.state.lock().unwrap().semantic_views.get(view_fqn).cloned()
    }

    pub fn seed_answer(&self, question: &str, sql: &str, answer: &str) {
        self.state
            .lock()
            .unwrap()
            .analyst_answers
            .insert(question.to_string(), (sql.to_string(), answer.to_string()));
    }

    // ── Fault injection & counters ─────────────────────────────

    pub fn fail_verify_transport(&self, times: u32) {
        self.state.lock().unwrap().verify_transport_failures = times;
    }

    pub fn reject_verify(&self, reason: &str) {
        self.state.lock().unwrap().verify_rejection = Some(reason.to_string());
    }

    pub fn reject_deploy(&self, reason: &str) {
        self.state.lock().unwrap().deploy_rejection = Some(reason.to_string());
    }

    pub fn verify_calls(&self) -> u32 {
        self.state.lock().unwrap().verify_calls
    }

    pub fn deploy_calls(&self) -> u32 {
        self.state.lock().unwrap().deploy_calls
    }
}

#[async_trait]
impl WarehouseAdapter for MockWarehouse {
    async fn verify(&self, yaml: &str, _database: &str, _schema: &str) -> Result<VerifyOutcome> {
        let mut state = self.state.lock().unwrap();
        state.verify_calls += 1;
        if state.verify_transport_failures > 0 {
            state.verify_transport_failures -= 1;
            return Err(OdlError::Transport("simulated connection reset".into()));
        }
        if let Some(reason) = &state.verify_rejection {
            return Ok(VerifyOutcome {
                ok: false,
                errors: vec![reason.clone()],
                warnings: vec![],
            });
        }
        if yaml.trim().is_empty() {
            return Ok(VerifyOutcome {
                ok: false,
                errors: vec!["empty semantic model".into()],
                warnings: vec![],
            });
        }
        Ok(VerifyOutcome {
            ok: true,
            errors: vec![],
            warnings: vec![],
        })
    }

    async fn deploy(
        &self,
        yaml: &str,
        database: &str,
        schema: &str,
        view_name: &str,
    ) -> Result<DeployCallOutcome> {
        let mut state = self.state.lock().unwrap();
        state.deploy_calls += 1;
        if let Some(reason) = &state.deploy_rejection {
            return Ok(DeployCallOutcome {
                ok: false,
                errors: vec![reason.clone()],
            });
        }
        let fqn = format!("{database}.{schema}.{view_name}");
        state.semantic_views.insert(fqn, yaml.to_string());
        Ok(DeployCallOutcome {
            ok: true,
            errors: vec![],
        })
    }

    async fn export_existing(&self, view_fqn: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().semantic_views.get(view_fqn).cloned())
    }

    async fn list_catalog(&self, database: &str, schema: &str) -> Result<Catalog> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .catalogs
            .get(&(database.to_string(), schema.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn ask(&self, _view_fqn: &str, question: &str) -> Result<AnalystAnswer> {
        let state = self.state.lock().unwrap();
        let (sql, answer) = state
            .analyst_answers
            .get(question)
            .cloned()
            .unwrap_or_else(|| ("SELECT 1".to_string(), "no data".to_string()));
        Ok(AnalystAnswer {
            sql,
            answer,
            latency_ms: state.analyst_latency_ms,
        })
    }
}
