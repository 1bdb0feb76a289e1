//! The command surface over the project lifecycle.
//!
//! Every status change goes through [`ProjectStore::attempt_transition`].
//! A task is only ever enqueued after its dispatching CAS was won, which is
//! what keeps a project at one outstanding task.

use std::sync::Arc;

use browserflow_core::error::CoreError;
use browserflow_core::project::{NewProject, UpdateProject};
use browserflow_core::project_events::{
    EVENT_PROJECT_CONTINUED, EVENT_PROJECT_CREATED, EVENT_PROJECT_DELETED,
    EVENT_PROJECT_RUN_DISPATCHED, EVENT_PROJECT_STOPPED, EVENT_PROJECT_UPDATED,
};
use browserflow_core::session::LiveSessionRef;
use browserflow_core::status::ProjectStatus;
use browserflow_core::task::{AgentTask, TaskKind};
use browserflow_core::types::{ProjectId, TaskId};
use browserflow_db::models::project::Project;
use browserflow_db::{ProjectStore, StatusGuard, StoreError, TaskQueue, TransitionEffects};
use browserflow_events::{EventBus, ProjectEvent};
use chrono::Utc;

use crate::cancel::CancelRegistry;

pub struct Dispatcher {
    store: Arc<dyn ProjectStore>,
    queue: Arc<dyn TaskQueue>,
    cancels: Arc<CancelRegistry>,
    events: Arc<EventBus>,
    stream_url_template: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        queue: Arc<dyn TaskQueue>,
        cancels: Arc<CancelRegistry>,
        events: Arc<EventBus>,
        stream_url_template: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue,
            cancels,
            events,
            stream_url_template: stream_url_template.into(),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, id: ProjectId) -> Result<Project, CoreError> {
        self.store
            .find(id)
            .await
            .map_err(|e| map_store_error(e, "read"))?
            .ok_or(CoreError::NotFound {
                entity: "project",
                id,
            })
    }

    pub async fn list(&self) -> Result<Vec<Project>, CoreError> {
        self.store.list().await.map_err(|e| map_store_error(e, "list"))
    }

    /// Hand the preserved live session of a BLOCKED project to an operator.
    ///
    /// A pure read: repeated calls return the same reference and nothing is
    /// enqueued.
    pub async fn resume(&self, id: ProjectId) -> Result<LiveSessionRef, CoreError> {
        let project = self.get(id).await?;
        require_status(&project, ProjectStatus::Blocked, "resume")?;
        project.live_session.ok_or_else(|| {
            CoreError::Internal(format!("blocked project {id} has no live session"))
        })
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Validate, store in INITIALIZING and promote to IDLE.
    ///
    /// Validation happens before anything is written, so a rejected
    /// definition leaves no record behind.
    pub async fn create(&self, input: NewProject) -> Result<Project, CoreError> {
        let definition = input.into_definition()?;
        let project = Project::new(definition, Utc::now());
        self.store
            .insert(&project)
            .await
            .map_err(|e| map_store_error(e, "create"))?;

        let project = match self
            .store
            .attempt_transition(
                project.id,
                ProjectStatus::Initializing.into(),
                ProjectStatus::Idle,
                TransitionEffects::new(),
            )
            .await
        {
            Ok(project) => project,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_unless_running(project.id).await {
                    tracing::error!(project_id = %project.id, error = %cleanup, "Failed to remove unpromoted project");
                }
                return Err(map_store_error(e, "create"));
            }
        };

        tracing::info!(project_id = %project.id, "Project created");
        self.publish(EVENT_PROJECT_CREATED, &project);
        Ok(project)
    }

    /// Edit the definition of an IDLE project.
    pub async fn update(&self, id: ProjectId, input: UpdateProject) -> Result<Project, CoreError> {
        let patch = input.into_patch()?;
        let project = self
            .store
            .update_definition(id, patch)
            .await
            .map_err(|e| map_store_error(e, "update"))?;

        self.publish(EVENT_PROJECT_UPDATED, &project);
        Ok(project)
    }

    /// Start a fresh run of an IDLE project in a new browser session.
    pub async fn run(&self, id: ProjectId) -> Result<Project, CoreError> {
        let project = self.get(id).await?;
        require_status(&project, ProjectStatus::Idle, "run")?;

        let task_id = TaskId::new_v4();
        let session_id = uuid::Uuid::new_v4().to_string();
        let live = LiveSessionRef::from_template(&self.stream_url_template, &session_id);

        let project = self
            .store
            .attempt_transition(
                id,
                ProjectStatus::Idle.into(),
                ProjectStatus::Running,
                TransitionEffects::new()
                    .live_session(live)
                    .assign_task(task_id)
                    .clear_error()
                    .mark_run_started(),
            )
            .await
            .map_err(|e| map_store_error(e, "run"))?;

        let task = agent_task(&project, task_id, TaskKind::Run, session_id);
        self.enqueue_or_roll_back(&task, ProjectStatus::Idle).await?;

        tracing::info!(project_id = %id, task_id = %task_id, "Run dispatched");
        self.publish(EVENT_PROJECT_RUN_DISPATCHED, &project);
        Ok(project)
    }

    /// Give a BLOCKED project back to the agent, re-attaching to the same
    /// browser session the operator worked in.
    pub async fn continue_run(&self, id: ProjectId) -> Result<Project, CoreError> {
        let project = self.get(id).await?;
        require_status(&project, ProjectStatus::Blocked, "continue")?;
        let session_id = project
            .live_session
            .as_ref()
            .map(|live| live.active_session_id.clone())
            .ok_or_else(|| {
                CoreError::Internal(format!("blocked project {id} has no live session"))
            })?;

        let task_id = TaskId::new_v4();
        let project = self
            .store
            .attempt_transition(
                id,
                ProjectStatus::Blocked.into(),
                ProjectStatus::Running,
                TransitionEffects::new()
                    .assign_task(task_id)
                    .clear_error()
                    .mark_run_started(),
            )
            .await
            .map_err(|e| map_store_error(e, "continue"))?;

        let task = agent_task(&project, task_id, TaskKind::Continue, session_id);
        self.enqueue_or_roll_back(&task, ProjectStatus::Blocked).await?;

        tracing::info!(project_id = %id, task_id = %task_id, "Continuation dispatched");
        self.publish(EVENT_PROJECT_CONTINUED, &project);
        Ok(project)
    }

    /// Return a RUNNING project to IDLE and cancel its task.
    ///
    /// The state change is authoritative immediately. The automation call
    /// may still finish in the background; its result loses the CAS.
    pub async fn stop(&self, id: ProjectId) -> Result<Project, CoreError> {
        let project = self.get(id).await?;
        require_status(&project, ProjectStatus::Running, "stop")?;
        let task_id = project.active_task_id;

        let project = self
            .store
            .attempt_transition(
                id,
                StatusGuard {
                    status: ProjectStatus::Running,
                    task_id,
                },
                ProjectStatus::Idle,
                TransitionEffects::new(),
            )
            .await
            .map_err(|e| map_store_error(e, "stop"))?;

        if let Some(task_id) = task_id {
            let local = self.cancels.cancel(task_id);
            tracing::info!(project_id = %id, task_id = %task_id, cancelled_locally = local, "Project stopped");
        }
        self.publish(EVENT_PROJECT_STOPPED, &project);
        Ok(project)
    }

    /// Remove a project that is not RUNNING.
    pub async fn delete(&self, id: ProjectId) -> Result<(), CoreError> {
        self.store
            .delete_unless_running(id)
            .await
            .map_err(|e| map_store_error(e, "delete"))?;

        tracing::info!(project_id = %id, "Project deleted");
        self.events
            .publish(ProjectEvent::new(EVENT_PROJECT_DELETED, id));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Enqueue `task`; if the queue refuses it, put the project back to
    /// `fallback` with the reason recorded.
    async fn enqueue_or_roll_back(
        &self,
        task: &AgentTask,
        fallback: ProjectStatus,
    ) -> Result<(), CoreError> {
        let Err(e) = self.queue.enqueue(task).await else {
            return Ok(());
        };

        tracing::error!(project_id = %task.project_id, task_id = %task.task_id, error = %e, "Failed to enqueue task");
        let rollback = self
            .store
            .attempt_transition(
                task.project_id,
                StatusGuard::task(ProjectStatus::Running, task.task_id),
                fallback,
                TransitionEffects::new().error(format!("Task could not be queued: {e}")),
            )
            .await;
        if let Err(rollback) = rollback {
            tracing::error!(project_id = %task.project_id, error = %rollback, "Failed to roll back undispatched task");
        }
        Err(CoreError::Unavailable(e.to_string()))
    }

    fn publish(&self, event_type: &str, project: &Project) {
        let mut payload = serde_json::Map::new();
        if let Some(task_id) = project.active_task_id {
            payload.insert("task_id".into(), task_id.to_string().into());
        }
        if let Some(live) = &project.live_session {
            payload.insert("active_session_id".into(), live.active_session_id.clone().into());
        }
        self.events.publish(
            ProjectEvent::new(event_type, project.id)
                .with_status(project.status)
                .with_payload(payload.into()),
        );
    }
}

fn require_status(
    project: &Project,
    expected: ProjectStatus,
    action: &'static str,
) -> Result<(), CoreError> {
    if project.status != expected {
        return Err(CoreError::InvalidState {
            id: project.id,
            status: project.status,
            action,
        });
    }
    Ok(())
}

fn agent_task(project: &Project, task_id: TaskId, kind: TaskKind, session_id: String) -> AgentTask {
    AgentTask {
        task_id,
        project_id: project.id,
        kind,
        session_id,
        instructions: project.instructions.clone(),
        session_state: project.session_state.clone(),
        output_schema: project.output_schema.clone(),
        enqueued_at: Utc::now(),
    }
}

/// Translate a store failure into the command error taxonomy.
fn map_store_error(error: StoreError, action: &'static str) -> CoreError {
    match error {
        StoreError::NotFound(id) => CoreError::NotFound {
            entity: "project",
            id,
        },
        StoreError::StatusMismatch {
            id,
            expected,
            actual,
        } if expected == actual => CoreError::Conflict(format!(
            "project {id} was claimed by a concurrent {action}"
        )),
        StoreError::StatusMismatch { id, actual, .. } if action == "update" => {
            CoreError::InvalidState {
                id,
                status: actual,
                action,
            }
        }
        StoreError::StatusMismatch { id, actual, .. } => CoreError::Conflict(format!(
            "project {id} changed to {actual} during {action}"
        )),
        StoreError::NotDeletable { id, status } => CoreError::InvalidState { id, status, action },
        other => {
            tracing::error!(error = %other, action, "Store operation failed");
            CoreError::Internal(other.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn lost_dispatch_race_is_a_conflict() {
        let id = ProjectId::new_v4();
        let err = map_store_error(
            StoreError::StatusMismatch {
                id,
                expected: ProjectStatus::Idle,
                actual: ProjectStatus::Running,
            },
            "run",
        );
        assert_matches!(err, CoreError::Conflict(_));
    }

    #[test]
    fn update_outside_idle_is_invalid_state() {
        let err = map_store_error(
            StoreError::StatusMismatch {
                id: ProjectId::new_v4(),
                expected: ProjectStatus::Idle,
                actual: ProjectStatus::Blocked,
            },
            "update",
        );
        assert_matches!(
            err,
            CoreError::InvalidState {
                status: ProjectStatus::Blocked,
                action: "update",
                ..
            }
        );
    }

    #[test]
    fn running_delete_is_invalid_state() {
        let err = map_store_error(
            StoreError::NotDeletable {
                id: ProjectId::new_v4(),
                status: ProjectStatus::Running,
            },
            "delete",
        );
        assert_matches!(err, CoreError::InvalidState { status: ProjectStatus::Running, .. });
    }
}
