use std::sync::Arc;

use browserflow_db::ProjectStore;
use browserflow_engine::Dispatcher;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle commands and reads.
    pub dispatcher: Arc<Dispatcher>,
    /// Store handle, used directly only by the health check.
    pub store: Arc<dyn ProjectStore>,
}
