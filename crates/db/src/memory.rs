//! In-process implementations of the store and queue.
//!
//! Used by tests and by the API when no `DATABASE_URL` is configured. The
//! store serializes every write under one lock, which makes each
//! `attempt_transition` trivially atomic.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use browserflow_core::project::DefinitionPatch;
use browserflow_core::status::ProjectStatus;
use browserflow_core::task::AgentTask;
use browserflow_core::types::{ProjectId, TaskId};
use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use crate::models::project::Project;
use crate::queue::{QueueError, TaskQueue};
use crate::store::{
    apply_claim, apply_definition_patch, apply_transition, ClaimOutcome, ProjectStore,
    StatusGuard, StoreError, TransitionEffects,
};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn insert(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        Ok(())
    }

    async fn find(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(projects)
    }

    async fn attempt_transition(
        &self,
        id: ProjectId,
        guard: StatusGuard,
        to: ProjectStatus,
        effects: TransitionEffects,
    ) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_transition(project, guard, to, effects, Utc::now())?;
        Ok(project.clone())
    }

    async fn update_definition(
        &self,
        id: ProjectId,
        patch: DefinitionPatch,
    ) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        apply_definition_patch(project, patch, Utc::now())?;
        Ok(project.clone())
    }

    async fn claim_task(
        &self,
        id: ProjectId,
        task_id: TaskId,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Ok(apply_claim(project, task_id, Utc::now()))
    }

    async fn delete_unless_running(&self, id: ProjectId) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects.get(&id).ok_or(StoreError::NotFound(id))?;
        if !project.status.is_deletable() {
            return Err(StoreError::NotDeletable {
                id,
                status: project.status,
            });
        }
        projects.remove(&id);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Bounded in-process queue. A full channel rejects new work rather than
/// blocking the dispatcher.
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    sender: Mutex<Option<mpsc::Sender<AgentTask>>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<AgentTask>>,
}

impl InMemoryTaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<AgentTask>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &AgentTask) -> Result<(), QueueError> {
        let sender = self.sender().ok_or(QueueError::Closed)?;
        sender.try_send(task.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn dequeue(&self) -> Result<Option<AgentTask>, QueueError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn ack(&self, _task_id: TaskId) -> Result<(), QueueError> {
        // Delivery out of the channel is already final.
        Ok(())
    }

    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
