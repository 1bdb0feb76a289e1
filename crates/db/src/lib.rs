//! State Store and Task Queue for browserflow.
//!
//! Both are exposed as traits ([`ProjectStore`], [`TaskQueue`]) with an
//! in-memory implementation (tests, single-process development) and a
//! PostgreSQL implementation (shared between API and worker processes).

use sqlx::postgres::PgPoolOptions;

pub mod memory;
pub mod models;
pub mod queue;
pub mod repositories;
pub mod store;

pub use memory::{InMemoryProjectStore, InMemoryTaskQueue};
pub use queue::{QueueError, TaskQueue};
pub use repositories::{PgProjectStore, PgTaskQueue};
pub use store::{
    ClaimOutcome, FieldUpdate, ProjectStore, StatusGuard, StoreError, TransitionEffects,
};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to prove the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
