//! Placeholder warehouse adapter for deployments without a wired warehouse.
//!
//! Concrete adapters live outside this repository; the binary falls back to
//! this stub so read-only lifecycle operations (versions, diff, evaluate,
//! compile) work while warehouse-touching stages fail with a clear message.

use async_trait::async_trait;

use odl_core::error::{OdlError, Result};
use odl_core::ports::{
    AnalystAnswer, Catalog, DeployCallOutcome, VerifyOutcome, WarehouseAdapter,
};

pub struct UnconfiguredWarehouse;

const MESSAGE: &str = "no warehouse adapter configured (set up a concrete adapter in main)";

#[async_trait]
impl WarehouseAdapter for UnconfiguredWarehouse {
    async fn verify(&self, _: &str, _: &str, _: &str) -> Result<VerifyOutcome> {
        Err(OdlError::Transport(MESSAGE.into()))
    }

    async fn deploy(&self, _: &str, _: &str, _: &str, _: &str) -> Result<DeployCallOutcome> {
        Err(OdlError::Transport(MESSAGE.into()))
    }

    async fn export_existing(&self, _: &str) -> Result<Option<String>> {
        Err(OdlError::Transport(MESSAGE.into()))
    }

    async fn list_catalog(&self, _: &str, _: &str) -> Result<Catalog> {
        Err(OdlError::Transport(MESSAGE.into()))
    }

    async fn ask(&self, _: &str, _: &str) -> Result<AnalystAnswer> {
        Err(OdlError::Transport(MESSAGE.into()))
    }
}
