use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use browserflow_api::config::ServerConfig;
use browserflow_api::router::build_app_router;
use browserflow_api::state::AppState;
use browserflow_engine::{
    AutomationConfig, Backend, CancelRegistry, Dispatcher, EngineConfig, StorageConfig,
    TaskExecutor, WorkerPool,
};
use browserflow_events::{EventBus, EventLogger};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "browserflow_api=debug,browserflow_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    let engine_config = EngineConfig::from_env().expect("Invalid engine configuration");
    let storage_config =
        StorageConfig::from_env(&engine_config).expect("Invalid storage configuration");
    let automation_config =
        AutomationConfig::from_env().expect("Invalid automation configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store and queue ---
    let backend = Backend::from_config(&engine_config, &storage_config)
        .await
        .expect("Failed to initialize storage backend");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let logger_handle = tokio::spawn(EventLogger::run(event_bus.subscribe()));

    // --- Dispatcher ---
    let cancels = Arc::new(CancelRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&backend.store),
        Arc::clone(&backend.queue),
        Arc::clone(&cancels),
        Arc::clone(&event_bus),
        engine_config.stream_url_template.clone(),
    ));

    // --- Embedded workers ---
    let worker_shutdown = CancellationToken::new();
    let pool_handle = if config.embedded_workers {
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&backend.store),
            automation_config.build_capability(),
            Arc::clone(&cancels),
            Arc::clone(&event_bus),
            engine_config.task_timeout,
            engine_config.cancel_poll_interval,
        ));
        let pool = WorkerPool::new(
            executor,
            Arc::clone(&backend.queue),
            engine_config.worker_concurrency,
        );
        let shutdown = worker_shutdown.clone();
        Some(tokio::spawn(async move { pool.run(shutdown).await }))
    } else {
        if backend.pool.is_none() {
            tracing::warn!(
                "Embedded workers disabled with an in-memory queue, runs will never execute"
            );
        }
        None
    };

    // --- App state ---
    let state = AppState {
        dispatcher,
        store: Arc::clone(&backend.store),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Let in-flight tasks finish; stops taking new ones.
    worker_shutdown.cancel();
    if let Some(handle) = pool_handle {
        let grace = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Worker pool did not drain in time, abandoning in-flight tasks"
            );
        }
    }

    backend.close().await;
    tracing::info!("Storage backend closed");

    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
