//! PostgreSQL-backed [`TaskQueue`] over the `project_tasks` table.
//!
//! Consumers poll with `FOR UPDATE SKIP LOCKED` so concurrent workers never
//! claim the same row. A claimed row that is not acked within the
//! visibility timeout becomes claimable again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use browserflow_core::task::AgentTask;
use browserflow_core::types::{ProjectId, TaskId};
use sqlx::PgPool;
use tokio::sync::Notify;

use crate::queue::{QueueError, TaskQueue};

/// Default delay between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct PgTaskQueue {
    pool: PgPool,
    poll_interval: Duration,
    visibility_timeout: Duration,
    closed: AtomicBool,
    wake: Notify,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
            visibility_timeout,
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Claim the oldest deliverable row, if any.
    async fn claim_next(&self) -> Result<Option<ClaimedRow>, QueueError> {
        let row = sqlx::query_as::<_, ClaimedRow>(
            "UPDATE project_tasks \
             SET claimed_at = NOW(), deliveries = deliveries + 1 \
             WHERE task_id = ( \
                 SELECT task_id FROM project_tasks \
                 WHERE claimed_at IS NULL \
                    OR claimed_at < NOW() - make_interval(secs => $1) \
                 ORDER BY enqueued_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING task_id, project_id, payload",
        )
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Remove a row whose payload cannot be decoded. Left in place it would
    /// be redelivered forever.
    async fn discard(
        &self,
        row: &ClaimedRow,
        error: &serde_json::Error,
    ) -> Result<(), QueueError> {
        tracing::error!(
            task_id = %row.task_id,
            project_id = %row.project_id,
            error = %error,
            "Dropping undecodable task; its project stays RUNNING until stopped"
        );
        self.ack(row.task_id).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ClaimedRow {
    task_id: TaskId,
    project_id: ProjectId,
    payload: serde_json::Value,
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, task: &AgentTask) -> Result<(), QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        sqlx::query(
            "INSERT INTO project_tasks (task_id, project_id, payload, enqueued_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(task.task_id)
        .bind(task.project_id)
        .bind(serde_json::to_value(task)?)
        .bind(task.enqueued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<AgentTask>, QueueError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Ok(None);
            }
            if let Some(row) = self.claim_next().await? {
                match serde_json::from_value::<AgentTask>(row.payload.clone()) {
                    Ok(task) => {
                        tracing::debug!(task_id = %task.task_id, project_id = %task.project_id, "Task claimed from queue");
                        return Ok(Some(task));
                    }
                    Err(e) => {
                        self.discard(&row, &e).await?;
                        continue;
                    }
                }
            }
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, task_id: TaskId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM project_tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }
}
