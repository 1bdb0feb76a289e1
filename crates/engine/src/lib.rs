//! Project orchestration: the dispatcher that owns the lifecycle commands
//! and the worker pool that executes queued tasks.

pub mod backend;
pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod pool;

pub use backend::{Backend, BackendError};
pub use cancel::CancelRegistry;
pub use config::{AutomationConfig, ConfigError, EngineConfig, StorageConfig};
pub use dispatcher::Dispatcher;
pub use executor::{ExecutionReport, TaskExecutor};
pub use pool::WorkerPool;
