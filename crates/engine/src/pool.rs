//! Bounded pool of worker loops over the shared task queue.
//!
//! Exactly `concurrency` loops pull from the queue, so at most that many
//! browser sessions are driven at once; further tasks wait in the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use browserflow_db::TaskQueue;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::executor::TaskExecutor;

/// Pause after a failed dequeue before polling again.
const DEQUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

pub struct WorkerPool {
    executor: Arc<TaskExecutor>,
    queue: Arc<dyn TaskQueue>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(executor: Arc<TaskExecutor>, queue: Arc<dyn TaskQueue>, concurrency: usize) -> Self {
        Self {
            executor,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Run until `shutdown` fires or the queue closes.
    ///
    /// Shutdown stops workers from taking new tasks; tasks already in
    /// flight run to completion before this returns.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(concurrency = self.concurrency, "Worker pool started");

        let mut workers = JoinSet::new();
        let mut slots = HashMap::new();
        for worker in 0..self.concurrency {
            self.spawn_worker(&mut workers, &mut slots, worker, &shutdown);
        }

        // A loop that panicked is replaced so the pool keeps its size.
        while let Some(joined) = workers.join_next_with_id().await {
            let e = match joined {
                Ok((id, ())) => {
                    slots.remove(&id);
                    continue;
                }
                Err(e) => e,
            };
            let Some(worker) = slots.remove(&e.id()) else { continue };
            tracing::error!(worker, error = %e, "Worker loop panicked");
            if e.is_panic() && !shutdown.is_cancelled() {
                tracing::info!(worker, "Restarting worker loop");
                self.spawn_worker(&mut workers, &mut slots, worker, &shutdown);
            }
        }
        tracing::info!("Worker pool stopped");
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<()>,
        slots: &mut HashMap<task::Id, usize>,
        worker: usize,
        shutdown: &CancellationToken,
    ) {
        let handle = workers.spawn(worker_loop(
            worker,
            Arc::clone(&self.executor),
            Arc::clone(&self.queue),
            shutdown.clone(),
        ));
        slots.insert(handle.id(), worker);
    }
}

async fn worker_loop(
    worker: usize,
    executor: Arc<TaskExecutor>,
    queue: Arc<dyn TaskQueue>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = queue.dequeue() => next,
        };

        match next {
            Ok(Some(task)) => {
                tracing::debug!(worker, task_id = %task.task_id, project_id = %task.project_id, "Task received");
                executor.execute(queue.as_ref(), task).await;
            }
            Ok(None) => {
                tracing::debug!(worker, "Queue closed");
                break;
            }
            Err(e) => {
                tracing::error!(worker, error = %e, "Failed to dequeue task");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(DEQUEUE_ERROR_BACKOFF) => {}
                }
            }
        }
    }
}
