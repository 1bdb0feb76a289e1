//! The State Store port and its compare-and-swap transition primitive.
//!
//! [`ProjectStore::attempt_transition`] is the only way a project's status
//! changes. It succeeds only when the stored record still matches the
//! caller's [`StatusGuard`], and applies the requested
//! [`TransitionEffects`] atomically with the status write. Both store
//! implementations share [`apply_transition`] so the invariants are
//! enforced identically.

use async_trait::async_trait;
use browserflow_core::project::DefinitionPatch;
use browserflow_core::session::{LiveSessionRef, SessionState};
use browserflow_core::status::ProjectStatus;
use browserflow_core::types::{ProjectId, TaskId, Timestamp};

use crate::models::project::Project;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Project {0} not found")]
    NotFound(ProjectId),

    /// The compare half of the CAS failed: someone else moved the project.
    #[error("Project {id} no longer matches the expected state (expected {expected}, found {actual})")]
    StatusMismatch {
        id: ProjectId,
        expected: ProjectStatus,
        actual: ProjectStatus,
    },

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: ProjectStatus,
        to: ProjectStatus,
    },

    #[error("Invalid transition effects: {0}")]
    InvalidEffects(&'static str),

    #[error("Project {id} cannot be deleted while {status}")]
    NotDeletable { id: ProjectId, status: ProjectStatus },

    #[error("Corrupt project record {id}: {reason}")]
    Corrupt { id: ProjectId, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Guard and effects
// ---------------------------------------------------------------------------

/// What the caller believes the stored record looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusGuard {
    pub status: ProjectStatus,
    /// When set, the record's `active_task_id` must also match.
    pub task_id: Option<TaskId>,
}

impl StatusGuard {
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status,
            task_id: None,
        }
    }

    /// Guard that also pins the owning task, so a stale worker cannot write
    /// over a later run of the same project.
    pub fn task(status: ProjectStatus, task_id: TaskId) -> Self {
        Self {
            status,
            task_id: Some(task_id),
        }
    }

    pub fn matches(&self, project: &Project) -> bool {
        project.status == self.status
            && self
                .task_id
                .is_none_or(|task_id| project.active_task_id == Some(task_id))
    }
}

impl From<ProjectStatus> for StatusGuard {
    fn from(status: ProjectStatus) -> Self {
        Self::status(status)
    }
}

/// Update to a nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> FieldUpdate<T> {
    fn apply(self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Set(value) => *slot = Some(value),
            FieldUpdate::Clear => *slot = None,
        }
    }
}

/// Side effects written atomically with a status change.
///
/// `session_state` can only be overwritten, never cleared: a failed run
/// leaves the previously captured credentials in place.
#[derive(Debug, Clone, Default)]
pub struct TransitionEffects {
    pub session_state: Option<SessionState>,
    pub live_session: FieldUpdate<LiveSessionRef>,
    pub active_task: FieldUpdate<TaskId>,
    pub last_error: FieldUpdate<String>,
    pub last_result: FieldUpdate<serde_json::Value>,
    pub mark_run_started: bool,
}

impl TransitionEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_state(mut self, state: SessionState) -> Self {
        self.session_state = Some(state);
        self
    }

    pub fn live_session(mut self, live: LiveSessionRef) -> Self {
        self.live_session = FieldUpdate::Set(live);
        self
    }

    pub fn assign_task(mut self, task_id: TaskId) -> Self {
        self.active_task = FieldUpdate::Set(task_id);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = FieldUpdate::Set(message.into());
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = FieldUpdate::Clear;
        self
    }

    pub fn result(mut self, output: serde_json::Value) -> Self {
        self.last_result = FieldUpdate::Set(output);
        self
    }

    pub fn mark_run_started(mut self) -> Self {
        self.mark_run_started = true;
        self
    }
}

/// Result of a worker trying to take ownership of a delivered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First delivery: the worker owns the run.
    Claimed,
    /// Duplicate delivery of a task some worker already claimed.
    AlreadyClaimed { claimed_at: Timestamp },
    /// The task is no longer the project's active task (stopped, finished,
    /// or superseded).
    NotCurrent { status: ProjectStatus },
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert(&self, project: &Project) -> Result<(), StoreError>;

    async fn find(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    /// All projects, newest first.
    async fn list(&self) -> Result<Vec<Project>, StoreError>;

    /// Compare-and-swap the project's status and apply `effects` with it.
    async fn attempt_transition(
        &self,
        id: ProjectId,
        guard: StatusGuard,
        to: ProjectStatus,
        effects: TransitionEffects,
    ) -> Result<Project, StoreError>;

    /// Edit instructions / output schema. Guarded on IDLE.
    async fn update_definition(
        &self,
        id: ProjectId,
        patch: DefinitionPatch,
    ) -> Result<Project, StoreError>;

    async fn claim_task(&self, id: ProjectId, task_id: TaskId)
        -> Result<ClaimOutcome, StoreError>;

    /// Remove the record unless it is RUNNING, atomically.
    async fn delete_unless_running(&self, id: ProjectId) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Shared transition logic
// ---------------------------------------------------------------------------

/// Apply a guarded transition to an in-hand record.
///
/// On error the record is left untouched.
pub fn apply_transition(
    project: &mut Project,
    guard: StatusGuard,
    to: ProjectStatus,
    effects: TransitionEffects,
    now: Timestamp,
) -> Result<(), StoreError> {
    if !guard.status.can_transition_to(to) {
        return Err(StoreError::InvalidTransition {
            from: guard.status,
            to,
        });
    }
    if !guard.matches(project) {
        return Err(StoreError::StatusMismatch {
            id: project.id,
            expected: guard.status,
            actual: project.status,
        });
    }

    let mut next = project.clone();
    let TransitionEffects {
        session_state,
        live_session,
        active_task,
        last_error,
        last_result,
        mark_run_started,
    } = effects;

    if let Some(state) = session_state {
        next.session_state = state;
    }

    live_session.apply(&mut next.live_session);
    if !to.holds_live_session() {
        next.live_session = None;
    } else if next.live_session.is_none() {
        return Err(StoreError::InvalidEffects(
            "RUNNING and BLOCKED require a live session reference",
        ));
    }

    if matches!(active_task, FieldUpdate::Set(_)) {
        next.task_claimed_at = None;
    }
    active_task.apply(&mut next.active_task_id);
    if to != ProjectStatus::Running {
        next.active_task_id = None;
        next.task_claimed_at = None;
    } else if next.active_task_id == project.active_task_id || next.active_task_id.is_none() {
        return Err(StoreError::InvalidEffects(
            "entering RUNNING requires a newly assigned task",
        ));
    }

    last_error.apply(&mut next.last_error);
    last_result.apply(&mut next.last_result);
    if mark_run_started {
        next.last_run_at = Some(now);
    }

    next.status = to;
    next.updated_at = now.max(project.updated_at);
    *project = next;
    Ok(())
}

/// Apply an IDLE-guarded definition edit to an in-hand record.
pub fn apply_definition_patch(
    project: &mut Project,
    patch: DefinitionPatch,
    now: Timestamp,
) -> Result<(), StoreError> {
    if project.status != ProjectStatus::Idle {
        return Err(StoreError::StatusMismatch {
            id: project.id,
            expected: ProjectStatus::Idle,
            actual: project.status,
        });
    }
    if let Some(instructions) = patch.instructions {
        project.instructions = instructions;
    }
    if let Some(schema) = patch.output_schema {
        project.output_schema = schema;
    }
    project.updated_at = now.max(project.updated_at);
    Ok(())
}

/// Decide whether `task_id` may be claimed and record the claim.
pub fn apply_claim(project: &mut Project, task_id: TaskId, now: Timestamp) -> ClaimOutcome {
    if project.status != ProjectStatus::Running || project.active_task_id != Some(task_id) {
        return ClaimOutcome::NotCurrent {
            status: project.status,
        };
    }
    if let Some(claimed_at) = project.task_claimed_at {
        return ClaimOutcome::AlreadyClaimed { claimed_at };
    }
    project.task_claimed_at = Some(now);
    project.updated_at = now.max(project.updated_at);
    ClaimOutcome::Claimed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use browserflow_core::project::ProjectDefinition;
    use browserflow_core::schema::OutputSchema;
    use chrono::{Duration, Utc};

    use super::*;

    fn project_in(status: ProjectStatus) -> Project {
        let mut project = Project::new(
            ProjectDefinition {
                instructions: "collect invoices".into(),
                output_schema: OutputSchema::empty(),
            },
            Utc::now(),
        );
        project.status = status;
        if status.holds_live_session() {
            project.live_session = Some(LiveSessionRef::new("https://stream/s1", "s1"));
        }
        if status == ProjectStatus::Running {
            project.active_task_id = Some(TaskId::new_v4());
        }
        project
    }

    fn live() -> LiveSessionRef {
        LiveSessionRef::new("https://stream/sess-42", "sess-42")
    }

    #[test]
    fn dispatch_sets_live_session_and_task() {
        let mut project = project_in(ProjectStatus::Idle);
        let task_id = TaskId::new_v4();
        let now = Utc::now();

        apply_transition(
            &mut project,
            ProjectStatus::Idle.into(),
            ProjectStatus::Running,
            TransitionEffects::new()
                .live_session(live())
                .assign_task(task_id)
                .mark_run_started(),
            now,
        )
        .unwrap();

        assert_eq!(project.status, ProjectStatus::Running);
        assert_eq!(project.live_session, Some(live()));
        assert_eq!(project.active_task_id, Some(task_id));
        assert_eq!(project.last_run_at, Some(now));
    }

    #[test]
    fn disallowed_pair_rejected_before_guard() {
        let mut project = project_in(ProjectStatus::Blocked);
        assert_matches!(
            apply_transition(
                &mut project,
                ProjectStatus::Blocked.into(),
                ProjectStatus::Idle,
                TransitionEffects::new(),
                Utc::now(),
            ),
            Err(StoreError::InvalidTransition { .. })
        );
        assert_eq!(project.status, ProjectStatus::Blocked);
    }

    #[test]
    fn guard_mismatch_leaves_record_untouched() {
        let mut project = project_in(ProjectStatus::Running);
        let before = project.clone();

        let result = apply_transition(
            &mut project,
            ProjectStatus::Idle.into(),
            ProjectStatus::Running,
            TransitionEffects::new().live_session(live()).assign_task(TaskId::new_v4()),
            Utc::now(),
        );

        assert_matches!(
            result,
            Err(StoreError::StatusMismatch {
                expected: ProjectStatus::Idle,
                actual: ProjectStatus::Running,
                ..
            })
        );
        assert_eq!(project.status, before.status);
        assert_eq!(project.active_task_id, before.active_task_id);
    }

    #[test]
    fn stale_task_guard_is_a_mismatch() {
        let mut project = project_in(ProjectStatus::Running);
        let result = apply_transition(
            &mut project,
            StatusGuard::task(ProjectStatus::Running, TaskId::new_v4()),
            ProjectStatus::Idle,
            TransitionEffects::new(),
            Utc::now(),
        );
        assert_matches!(result, Err(StoreError::StatusMismatch { .. }));
        assert_eq!(project.status, ProjectStatus::Running);
    }

    #[test]
    fn entering_running_without_live_session_rejected() {
        let mut project = project_in(ProjectStatus::Idle);
        assert_matches!(
            apply_transition(
                &mut project,
                ProjectStatus::Idle.into(),
                ProjectStatus::Running,
                TransitionEffects::new().assign_task(TaskId::new_v4()),
                Utc::now(),
            ),
            Err(StoreError::InvalidEffects(_))
        );
        assert_eq!(project.status, ProjectStatus::Idle);
    }

    #[test]
    fn entering_running_requires_new_task() {
        let mut project = project_in(ProjectStatus::Blocked);
        assert_matches!(
            apply_transition(
                &mut project,
                ProjectStatus::Blocked.into(),
                ProjectStatus::Running,
                TransitionEffects::new(),
                Utc::now(),
            ),
            Err(StoreError::InvalidEffects(_))
        );
    }

    #[test]
    fn success_clears_live_session_and_task_but_keeps_newer_cookies() {
        let mut project = project_in(ProjectStatus::Running);
        let task_id = project.active_task_id.unwrap();
        let cookies = SessionState::new(serde_json::json!({"sid": "fresh"}));

        apply_transition(
            &mut project,
            StatusGuard::task(ProjectStatus::Running, task_id),
            ProjectStatus::Idle,
            TransitionEffects::new()
                .session_state(cookies.clone())
                .result(serde_json::json!({"invoices": 3})),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(project.status, ProjectStatus::Idle);
        assert_eq!(project.live_session, None);
        assert_eq!(project.active_task_id, None);
        assert_eq!(project.session_state, cookies);
        assert_eq!(project.last_result, Some(serde_json::json!({"invoices": 3})));
    }

    #[test]
    fn failure_keeps_previous_cookies() {
        let mut project = project_in(ProjectStatus::Running);
        let cookies = SessionState::new(serde_json::json!({"sid": "old"}));
        project.session_state = cookies.clone();

        apply_transition(
            &mut project,
            ProjectStatus::Running.into(),
            ProjectStatus::Idle,
            TransitionEffects::new().error("boom"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(project.session_state, cookies);
        assert_eq!(project.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn updated_at_never_moves_backwards() {
        let mut project = project_in(ProjectStatus::Running);
        let later = project.updated_at;
        let earlier = later - Duration::seconds(30);

        apply_transition(
            &mut project,
            ProjectStatus::Running.into(),
            ProjectStatus::Blocked,
            TransitionEffects::new(),
            earlier,
        )
        .unwrap();

        assert_eq!(project.updated_at, later);
    }

    #[test]
    fn claim_once_then_duplicate() {
        let mut project = project_in(ProjectStatus::Running);
        let task_id = project.active_task_id.unwrap();
        let now = Utc::now();

        assert_eq!(apply_claim(&mut project, task_id, now), ClaimOutcome::Claimed);
        assert_eq!(
            apply_claim(&mut project, task_id, Utc::now()),
            ClaimOutcome::AlreadyClaimed { claimed_at: now }
        );
    }

    #[test]
    fn claim_of_foreign_task_is_not_current() {
        let mut project = project_in(ProjectStatus::Idle);
        assert_eq!(
            apply_claim(&mut project, TaskId::new_v4(), Utc::now()),
            ClaimOutcome::NotCurrent {
                status: ProjectStatus::Idle
            }
        );
    }

    #[test]
    fn definition_patch_requires_idle() {
        let mut project = project_in(ProjectStatus::Blocked);
        let patch = DefinitionPatch {
            instructions: Some("collect receipts".into()),
            output_schema: None,
        };
        assert_matches!(
            apply_definition_patch(&mut project, patch, Utc::now()),
            Err(StoreError::StatusMismatch { .. })
        );
        assert_eq!(project.instructions, "collect invoices");
    }
}
