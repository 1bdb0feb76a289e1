//! PostgreSQL implementations of the store and queue ports.

pub mod project_repo;
pub mod task_queue_repo;

pub use project_repo::PgProjectStore;
pub use task_queue_repo::PgTaskQueue;
