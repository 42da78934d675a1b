//! Verifier / Deployer — two-phase promotion of a compiled bundle.
//!
//! Policy: capture the live view's YAML for rollback *before* anything else,
//! then verify, then deploy. Any failure leaves the live view untouched.
//! Verify calls are retried on transport errors (100ms / 400ms / 1600ms
//! backoff); deploy is never auto-retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compile::bundle::{
    ArtifactBundle, ROLLBACK_FILE, ROLLBACK_MODEL_FILE, SEMANTIC_MODEL_FILE,
};
use crate::compile::scripts;
use crate::config::EngineConfig;
use crate::error::{OdlError, Result};
use crate::ports::WarehouseAdapter;
use crate::runner::CancelFlag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTarget {
    pub database: String,
    pub schema: String,
    pub view_name: String,
}

impl DeployTarget {
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.view_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub view_fqn: String,
    pub rollback_captured: bool,
    pub warnings: Vec<String>,
}

pub struct Deployer {
    adapter: Arc<dyn WarehouseAdapter>,
    config: EngineConfig,
}

impl Deployer {
    pub fn new(adapter: Arc<dyn WarehouseAdapter>, config: EngineConfig) -> Self {
        Self { adapter, config }
    }

    /// Verify-only pass over a bundle's semantic model. Retries transport
    /// errors with the standard backoff; a semantic rejection surfaces as
    /// `VERIFY_FAILED` immediately.
    pub async fn verify_bundle(
        &self,
        bundle: &ArtifactBundle,
        target: &DeployTarget,
    ) -> Result<Vec<String>> {
        let yaml = bundle_yaml(bundle)?;
        self.verify_with_retries(&yaml, target).await
    }

    /// Full deployment: rollback capture, verify, deploy, in that order.
    /// The bundle is updated in place with the captured rollback model.
    pub async fn deploy_bundle(
        &self,
        bundle: &mut ArtifactBundle,
        target: &DeployTarget,
        cancel: &CancelFlag,
    ) -> Result<DeployReport> {
        let yaml = bundle_yaml(bundle)?;
        let fqn = target.fqn();
        let mut warnings = Vec::new();

        // Phase 0: capture the current definition for rollback.
        let existing = with_deadline(self.config.verify_timeout, "export_existing", async {
            self.adapter.export_existing(&fqn).await
        })
        .await?;

        let rollback_captured = match existing {
            Some(captured) => {
                tracing::info!(view = %fqn, "captured pre-deploy rollback model");
                bundle.upsert_file(ROLLBACK_MODEL_FILE, captured.clone());
                bundle.upsert_file(
                    ROLLBACK_FILE,
                    scripts::rollback_sql(
                        &target.database,
                        &target.schema,
                        &target.view_name,
                        Some(&captured),
                    ),
                );
                true
            }
            None => {
                tracing::warn!(view = %fqn, "no existing view; rollback model unavailable");
                warnings.push(format!(
                    "ROLLBACK_UNAVAILABLE: no existing view at {fqn}; rollback.sql is drop-only"
                ));
                false
            }
        };

        cancel.checkpoint()?;

        // Phase 1: verify-only.
        let verify_warnings = self.verify_with_retries(&yaml, target).await?;
        warnings.extend(verify_warnings);

        cancel.checkpoint()?;

        // Phase 2: deploy. Single attempt, longer deadline.
        let outcome = with_deadline(self.config.deploy_timeout, "deploy", async {
            self.adapter
                .deploy(&yaml, &target.database, &target.schema, &target.view_name)
                .await
        })
        .await?;
        if !outcome.ok {
            return Err(OdlError::DeployFailed(outcome.errors.join("; ")));
        }
        tracing::info!(view = %fqn, "semantic view deployed");

        Ok(DeployReport {
            view_fqn: fqn,
            rollback_captured,
            warnings,
        })
    }

    async fn verify_with_retries(
        &self,
        yaml: &str,
        target: &DeployTarget,
    ) -> Result<Vec<String>> {
        let mut attempt = 0u32;
        loop {
            let result = with_deadline(self.config.verify_timeout, "verify", async {
                self.adapter
                    .verify(yaml, &target.database, &target.schema)
                    .await
            })
            .await;

            match result {
                Ok(outcome) if outcome.ok => return Ok(outcome.warnings),
                Ok(outcome) => {
                    return Err(OdlError::VerifyFailed(outcome.errors.join("; ")));
                }
                Err(err) if err.retryable() && attempt < self.config.verify_retries => {
                    attempt += 1;
                    let backoff = self.config.verify_backoff(attempt);
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "verify transport error; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn bundle_yaml(bundle: &ArtifactBundle) -> Result<String> {
    bundle
        .file(SEMANTIC_MODEL_FILE)
        .map(|f| f.content.clone())
        .ok_or_else(|| OdlError::DeployFailed("bundle has no semantic_model.yaml".into()))
}

async fn with_deadline<T, F>(duration: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(OdlError::Timeout(format!(
            "{what} exceeded {}s deadline",
            duration.as_secs()
        ))),
    }
}
