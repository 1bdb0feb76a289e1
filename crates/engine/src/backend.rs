//! Construction of the store and queue selected by [`StorageConfig`].

use std::sync::Arc;

use browserflow_db::{
    DbPool, InMemoryProjectStore, InMemoryTaskQueue, PgProjectStore, PgTaskQueue, ProjectStore,
    TaskQueue,
};

use crate::config::{EngineConfig, StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// The shared store and queue handles, injected into the dispatcher and
/// the worker pool.
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn ProjectStore>,
    pub queue: Arc<dyn TaskQueue>,
    /// Present for the PostgreSQL backend, to close on shutdown.
    pub pool: Option<DbPool>,
}

impl Backend {
    /// Single-process backend. Tasks do not survive a restart.
    pub fn in_memory(engine: &EngineConfig) -> Self {
        Self {
            store: Arc::new(InMemoryProjectStore::new()),
            queue: Arc::new(InMemoryTaskQueue::new(engine.queue_capacity)),
            pool: None,
        }
    }

    /// Connect, migrate and build the PostgreSQL store and queue.
    pub async fn postgres(database_url: &str, storage: &StorageConfig) -> Result<Self, BackendError> {
        let pool = browserflow_db::create_pool(database_url, storage.max_connections).await?;
        browserflow_db::health_check(&pool).await?;
        tracing::info!("Database connection established");

        browserflow_db::run_migrations(&pool).await?;
        tracing::info!("Database migrations applied");

        let queue = PgTaskQueue::new(pool.clone(), storage.queue_visibility_timeout)
            .with_poll_interval(storage.queue_poll_interval);
        Ok(Self {
            store: Arc::new(PgProjectStore::new(pool.clone())),
            queue: Arc::new(queue),
            pool: Some(pool),
        })
    }

    /// PostgreSQL when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn from_config(
        engine: &EngineConfig,
        storage: &StorageConfig,
    ) -> Result<Self, BackendError> {
        match &storage.database_url {
            Some(url) => Self::postgres(url, storage).await,
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store and queue");
                Ok(Self::in_memory(engine))
            }
        }
    }

    /// Stop handing out tasks and release database connections.
    pub async fn close(&self) {
        self.queue.close();
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
