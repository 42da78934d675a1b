//! Postgres adapters for the lifecycle engine's storage ports.

pub mod rows;
pub mod store;

use sqlx::PgPool;

pub use store::{PgDriftStore, PgOntologyStore, PgRunStore};

/// All port implementations over one pool.
pub struct PgStores {
    pub ontologies: PgOntologyStore,
    pub runs: PgRunStore,
    pub drift: PgDriftStore,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ontologies: PgOntologyStore::new(pool.clone()),
            runs: PgRunStore::new(pool.clone()),
            drift: PgDriftStore::new(pool),
        }
    }
}

/// Apply the schema migration. Idempotent (CREATE IF NOT EXISTS throughout).
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/0001_init.sql"))
        .execute(pool)
        .await?;
    Ok(())
}
