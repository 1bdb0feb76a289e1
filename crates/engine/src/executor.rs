//! Execution of one delivered task.
//!
//! The executor claims the task, drives the automation call under a time
//! limit while watching for a stop, and writes the outcome back with a
//! task-guarded CAS. A write that loses the CAS is dropped: the store is the
//! authority, not the worker's local view.

use std::sync::Arc;
use std::time::Duration;

use browserflow_automation::{AutomationCapability, AutomationOutcome, AutomationRequest};
use browserflow_core::outcome::RunFailure;
use browserflow_core::project_events::{
    EVENT_PROJECT_BLOCKED, EVENT_PROJECT_COMPLETED, EVENT_PROJECT_FAILED,
};
use browserflow_core::status::ProjectStatus;
use browserflow_core::task::AgentTask;
use browserflow_core::types::{ProjectId, TaskId};
use browserflow_db::models::project::Project;
use browserflow_db::{
    ClaimOutcome, ProjectStore, StatusGuard, StoreError, TaskQueue, TransitionEffects,
};
use browserflow_events::{EventBus, ProjectEvent};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::cancel::CancelRegistry;

/// Recorded on the project when the automation call panics.
pub const CAPABILITY_CRASHED: &str = "automation capability crashed";

/// What became of a delivered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionReport {
    /// Project moved RUNNING -> IDLE with the result recorded.
    Completed,
    /// Project moved RUNNING -> BLOCKED; the session is left open.
    Blocked,
    /// Project moved RUNNING -> IDLE with the failure recorded.
    Failed(RunFailure),
    /// The project was stopped while the call was in flight.
    Stopped,
    /// The task was not the project's current task, or was a duplicate
    /// delivery of one still in progress.
    Skipped,
    /// The outcome arrived after the project had moved on and was dropped.
    Discarded,
    /// The store could not be reached; the task is left for redelivery.
    StoreUnavailable,
}

impl ExecutionReport {
    /// Whether the delivery is finished with and may be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, ExecutionReport::StoreUnavailable)
    }
}

pub struct TaskExecutor {
    store: Arc<dyn ProjectStore>,
    capability: Arc<dyn AutomationCapability>,
    cancels: Arc<CancelRegistry>,
    events: Arc<EventBus>,
    task_timeout: Duration,
    cancel_poll_interval: Duration,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        capability: Arc<dyn AutomationCapability>,
        cancels: Arc<CancelRegistry>,
        events: Arc<EventBus>,
        task_timeout: Duration,
        cancel_poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            capability,
            cancels,
            events,
            task_timeout,
            cancel_poll_interval,
        }
    }

    /// Handle one delivery and acknowledge it unless it must be retried.
    pub async fn execute(&self, queue: &dyn TaskQueue, task: AgentTask) -> ExecutionReport {
        let task_id = task.task_id;
        let project_id = task.project_id;

        let token = self.cancels.register(task_id);
        let report = self.drive(task, token).await;
        self.cancels.remove(task_id);

        tracing::info!(project_id = %project_id, task_id = %task_id, report = ?report, "Task finished");

        if report.should_ack() {
            if let Err(e) = queue.ack(task_id).await {
                tracing::warn!(task_id = %task_id, error = %e, "Failed to ack task");
            }
        }
        report
    }

    async fn drive(&self, task: AgentTask, token: CancellationToken) -> ExecutionReport {
        let project_id = task.project_id;
        let task_id = task.task_id;

        match self.store.claim_task(project_id, task_id).await {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(ClaimOutcome::AlreadyClaimed { claimed_at }) => {
                let overdue = (Utc::now() - claimed_at)
                    .to_std()
                    .is_ok_and(|age| age > self.task_timeout);
                if !overdue {
                    tracing::debug!(project_id = %project_id, task_id = %task_id, "Duplicate delivery ignored");
                    return ExecutionReport::Skipped;
                }
                tracing::warn!(project_id = %project_id, task_id = %task_id, "Reaping task abandoned by its worker");
                let failure = RunFailure::Abandoned(format!(
                    "no result within {}s of being claimed",
                    self.task_timeout.as_secs()
                ));
                return self.record_failure(project_id, task_id, failure).await;
            }
            Ok(ClaimOutcome::NotCurrent { status }) => {
                tracing::debug!(project_id = %project_id, task_id = %task_id, status = %status, "Task is no longer current");
                return ExecutionReport::Skipped;
            }
            Err(StoreError::NotFound(_)) => return ExecutionReport::Skipped,
            Err(e) => {
                tracing::error!(project_id = %project_id, task_id = %task_id, error = %e, "Failed to claim task");
                return ExecutionReport::StoreUnavailable;
            }
        }

        // Spawned so a panicking capability surfaces as a JoinError instead
        // of unwinding through the worker. Dropping the handle aborts the call.
        let capability = Arc::clone(&self.capability);
        let request = AutomationRequest::from(task);
        let call = tokio::time::timeout(
            self.task_timeout,
            AbortOnDropHandle::new(tokio::spawn(async move { capability.execute(request).await })),
        );
        tokio::pin!(call);

        let mut poll = tokio::time::interval(self.cancel_poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        poll.tick().await;

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(project_id = %project_id, task_id = %task_id, "Task cancelled");
                    return ExecutionReport::Stopped;
                }
                _ = poll.tick() => {
                    if !self.still_current(project_id, task_id).await {
                        tracing::info!(project_id = %project_id, task_id = %task_id, "Project moved on, abandoning call");
                        return ExecutionReport::Stopped;
                    }
                }
                result = &mut call => break result,
            }
        };

        match result {
            Err(_elapsed) => {
                self.record_failure(project_id, task_id, RunFailure::TimedOut(self.task_timeout))
                    .await
            }
            Ok(Err(join_error)) => {
                tracing::error!(project_id = %project_id, task_id = %task_id, error = %join_error, "Automation call crashed");
                self.record_failure(
                    project_id,
                    task_id,
                    RunFailure::Capability(CAPABILITY_CRASHED.to_string()),
                )
                .await
            }
            Ok(Ok(Err(e))) => {
                self.record_failure(project_id, task_id, RunFailure::Capability(e.to_string()))
                    .await
            }
            Ok(Ok(Ok(AutomationOutcome::Completed {
                output,
                session_state,
            }))) => {
                let mut effects = TransitionEffects::new().result(output).clear_error();
                if let Some(state) = session_state {
                    effects = effects.session_state(state);
                }
                self.record(project_id, task_id, ProjectStatus::Idle, effects)
                    .await
                    .map_or_else(|r| r, |project| {
                        self.publish(EVENT_PROJECT_COMPLETED, &project, serde_json::json!({}));
                        ExecutionReport::Completed
                    })
            }
            Ok(Ok(Ok(AutomationOutcome::Blocked {
                session_state,
                live_session,
                reason,
            }))) => {
                let mut effects = TransitionEffects::new();
                if let Some(state) = session_state {
                    effects = effects.session_state(state);
                }
                if let Some(live) = live_session {
                    effects = effects.live_session(live);
                }
                self.record(project_id, task_id, ProjectStatus::Blocked, effects)
                    .await
                    .map_or_else(|r| r, |project| {
                        let live = project.live_session.as_ref();
                        self.publish(
                            EVENT_PROJECT_BLOCKED,
                            &project,
                            serde_json::json!({
                                "reason": reason,
                                "live_stream_url": live.map(|l| l.live_stream_url.as_str()),
                                "active_session_id": live.map(|l| l.active_session_id.as_str()),
                            }),
                        );
                        ExecutionReport::Blocked
                    })
            }
        }
    }

    async fn record_failure(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        failure: RunFailure,
    ) -> ExecutionReport {
        tracing::warn!(project_id = %project_id, task_id = %task_id, error = %failure, "Run failed");
        let effects = TransitionEffects::new().error(failure.to_string());
        match self.record(project_id, task_id, ProjectStatus::Idle, effects).await {
            Ok(project) => {
                self.publish(
                    EVENT_PROJECT_FAILED,
                    &project,
                    serde_json::json!({ "error": failure.to_string() }),
                );
                ExecutionReport::Failed(failure)
            }
            Err(report) => report,
        }
    }

    /// Task-guarded result write. A lost CAS becomes `Discarded`.
    async fn record(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        to: ProjectStatus,
        effects: TransitionEffects,
    ) -> Result<Project, ExecutionReport> {
        match self
            .store
            .attempt_transition(
                project_id,
                StatusGuard::task(ProjectStatus::Running, task_id),
                to,
                effects,
            )
            .await
        {
            Ok(project) => Ok(project),
            Err(StoreError::StatusMismatch { actual, .. }) => {
                tracing::info!(project_id = %project_id, task_id = %task_id, status = %actual, "Result discarded, project already moved on");
                Err(ExecutionReport::Discarded)
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(project_id = %project_id, task_id = %task_id, "Result discarded, project deleted");
                Err(ExecutionReport::Discarded)
            }
            Err(e) => {
                tracing::error!(project_id = %project_id, task_id = %task_id, error = %e, "Failed to record result");
                Err(ExecutionReport::StoreUnavailable)
            }
        }
    }

    /// Whether `task_id` still owns the project. Store errors count as yes;
    /// the final CAS settles it either way.
    async fn still_current(&self, project_id: ProjectId, task_id: TaskId) -> bool {
        match self.store.find(project_id).await {
            Ok(Some(project)) => {
                project.status == ProjectStatus::Running && project.active_task_id == Some(task_id)
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Cancellation poll failed");
                true
            }
        }
    }

    fn publish(&self, event_type: &str, project: &Project, payload: serde_json::Value) {
        self.events.publish(
            ProjectEvent::new(event_type, project.id)
                .with_status(project.status)
                .with_payload(payload),
        );
    }
}
