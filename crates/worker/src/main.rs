//! Standalone worker process.
//!
//! Pulls tasks from the shared PostgreSQL queue. Any number of these can run
//! next to the API server; each drives at most `WORKER_CONCURRENCY` sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use browserflow_engine::config::env_or;
use browserflow_engine::{
    AutomationConfig, Backend, CancelRegistry, EngineConfig, StorageConfig, TaskExecutor,
    WorkerPool,
};
use browserflow_events::{EventBus, EventLogger};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "browserflow_worker=debug,browserflow_engine=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine_config = EngineConfig::from_env().expect("Invalid engine configuration");
    let storage_config =
        StorageConfig::from_env(&engine_config).expect("Invalid storage configuration");
    let automation_config =
        AutomationConfig::from_env().expect("Invalid automation configuration");
    let shutdown_timeout_secs: u64 =
        env_or("SHUTDOWN_TIMEOUT_SECS", 30).expect("Invalid SHUTDOWN_TIMEOUT_SECS");

    // An in-memory queue would never see the API's tasks.
    let database_url = storage_config
        .database_url
        .clone()
        .expect("DATABASE_URL must be set");
    let backend = Backend::postgres(&database_url, &storage_config)
        .await
        .expect("Failed to initialize storage backend");

    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(event_bus.subscribe()));

    // Stops issued through the API reach this process via the store poll.
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&backend.store),
        automation_config.build_capability(),
        Arc::new(CancelRegistry::new()),
        Arc::clone(&event_bus),
        engine_config.task_timeout,
        engine_config.cancel_poll_interval,
    ));
    let pool = WorkerPool::new(
        executor,
        Arc::clone(&backend.queue),
        engine_config.worker_concurrency,
    );

    let shutdown = CancellationToken::new();
    let pool_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { pool.run(shutdown).await }
    });

    shutdown_signal().await;
    shutdown.cancel();

    if tokio::time::timeout(Duration::from_secs(shutdown_timeout_secs), pool_handle)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = shutdown_timeout_secs,
            "Worker pool did not drain in time, abandoning in-flight tasks"
        );
    }

    backend.close().await;
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    tracing::info!("Worker shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
