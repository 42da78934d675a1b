//! Test harness for the lifecycle engine: in-memory store implementations,
//! a scriptable mock warehouse, and shared fixtures.
//!
//! Production code never depends on this crate; integration tests across the
//! workspace do.

pub mod fixtures;
pub mod mem;
pub mod mock;

use std::sync::Arc;

use odl_core::config::EngineConfig;
use odl_core::LifecycleService;

pub use mem::MemStores;
pub use mock::MockWarehouse;

/// A fully wired service over in-memory stores and the mock warehouse.
pub fn service_with(config: EngineConfig, warehouse: Arc<MockWarehouse>) -> Arc<LifecycleService> {
    let stores = MemStores::new();
    Arc::new(LifecycleService::new(
        config,
        Arc::new(stores.clone()),
        Arc::new(stores.clone()),
        Arc::new(stores),
        warehouse,
    ))
}

/// Service plus a mock warehouse pre-seeded with the retail catalog.
pub fn retail_service() -> (Arc<LifecycleService>, Arc<MockWarehouse>) {
    let warehouse = Arc::new(MockWarehouse::new());
    for (table, columns) in fixtures::RETAIL_CATALOG {
        warehouse.add_table("RETAIL_DB", "PUBLIC", table, columns);
    }
    let service = service_with(EngineConfig::default(), Arc::clone(&warehouse));
    (service, warehouse)
}
