//! Shared server state.

use std::sync::Arc;

use odl_core::runner::AsyncRunner;
use odl_core::LifecycleService;

pub struct AppState {
    pub service: Arc<LifecycleService>,
    pub runner: Arc<AsyncRunner>,
}

impl AppState {
    pub fn new(service: Arc<LifecycleService>, runner: Arc<AsyncRunner>) -> Arc<Self> {
        Arc::new(Self { service, runner })
    }
}
