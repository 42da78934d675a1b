//! odl_server — standalone REST server for the ontology lifecycle engine.
//!
//! Reads config from env vars:
//!   ODL_DATABASE_URL — Postgres connection string (required)
//!   ODL_BIND_ADDR    — listen address (default: 0.0.0.0:4200)
//!   ODL_*            — engine overrides, see odl_core::config

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use odl_core::config::EngineConfig;
use odl_core::runner::AsyncRunner;
use odl_core::LifecycleService;
use odl_postgres::PgStores;
use odl_server::warehouse::UnconfiguredWarehouse;
use odl_server::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,odl_server=debug".into()),
        )
        .init();

    let database_url =
        std::env::var("ODL_DATABASE_URL").expect("ODL_DATABASE_URL must be set");
    let bind_addr = std::env::var("ODL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4200".into());
    let config = EngineConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("failed to connect to database");
    odl_postgres::run_migrations(&pool)
        .await
        .expect("migrations failed");
    tracing::info!("connected to database, schema ready");

    let stores = PgStores::new(pool);
    let runner = Arc::new(AsyncRunner::new(config.max_concurrent_tasks));
    let service = Arc::new(LifecycleService::new(
        config,
        Arc::new(stores.ontologies),
        Arc::new(stores.runs),
        Arc::new(stores.drift),
        // Concrete warehouse adapters are wired here per deployment; the
        // stub keeps warehouse-free operations available.
        Arc::new(UnconfiguredWarehouse),
    ));

    let router = build_router(AppState::new(service, runner));
    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("cannot bind {bind_addr}: {e}"));
    tracing::info!(%bind_addr, "odl_server listening");
    axum::serve(listener, router).await.expect("server error");
}
