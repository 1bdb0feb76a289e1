//! In-process cancellation of running tasks.
//!
//! Workers register a token per task; `stop` cancels it so the capability
//! future is dropped right away. Stops issued from another process are
//! picked up by the executor's store poll instead.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use browserflow_core::types::TaskId;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_id: TaskId) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(task_id)
            .or_default()
            .clone()
    }

    /// Returns `false` when no worker in this process holds the task.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, task_id: TaskId) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
    }
}
