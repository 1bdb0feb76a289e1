//! The Task Queue port.
//!
//! Delivery is at-least-once: a dequeued task that is never acknowledged is
//! redelivered (the Postgres queue after its visibility timeout). Workers
//! guard against duplicates with [`ProjectStore::claim_task`].
//!
//! [`ProjectStore::claim_task`]: crate::store::ProjectStore::claim_task

use async_trait::async_trait;
use browserflow_core::task::AgentTask;
use browserflow_core::types::TaskId;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Task queue is full")]
    Full,

    #[error("Task queue is closed")]
    Closed,

    #[error("Corrupt task payload: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Hand a task to the workers. Fails fast instead of blocking when the
    /// queue cannot accept it.
    async fn enqueue(&self, task: &AgentTask) -> Result<(), QueueError>;

    /// Wait for the next task. `Ok(None)` means the queue was closed and
    /// drained; the caller should stop polling.
    async fn dequeue(&self) -> Result<Option<AgentTask>, QueueError>;

    /// Mark a delivered task as done so it is never redelivered.
    async fn ack(&self, task_id: TaskId) -> Result<(), QueueError>;

    /// Stop accepting tasks and wake idle consumers.
    fn close(&self);
}
