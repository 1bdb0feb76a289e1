//! Project entity model.

use browserflow_core::project::ProjectDefinition;
use browserflow_core::schema::OutputSchema;
use browserflow_core::session::{LiveSessionRef, SessionState};
use browserflow_core::status::ProjectStatus;
use browserflow_core::types::{ProjectId, TaskId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::status::{StatusId, StatusIdMap};
use crate::store::StoreError;

/// A project record: the unit of work tracked by the state machine.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub status: ProjectStatus,
    pub instructions: String,
    pub output_schema: OutputSchema,
    /// Credentials carried across runs. Never serialized outward.
    #[serde(skip_serializing)]
    pub session_state: SessionState,
    /// Present iff `status` is RUNNING or BLOCKED.
    pub live_session: Option<LiveSessionRef>,
    /// The task that currently owns the project; only set while RUNNING.
    pub active_task_id: Option<TaskId>,
    /// When a worker first claimed `active_task_id`.
    pub task_claimed_at: Option<Timestamp>,
    pub last_result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub last_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// A fresh record in INITIALIZING.
    pub fn new(definition: ProjectDefinition, now: Timestamp) -> Self {
        Self {
            id: ProjectId::new_v4(),
            status: ProjectStatus::Initializing,
            instructions: definition.instructions,
            output_schema: definition.output_schema,
            session_state: SessionState::empty(),
            live_session: None,
            active_task_id: None,
            task_claimed_at: None,
            last_result: None,
            last_error: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_session_state(&self) -> bool {
        !self.session_state.is_empty()
    }
}

/// A row from the `projects` table.
#[derive(Debug, FromRow)]
pub(crate) struct ProjectRow {
    pub id: ProjectId,
    pub status_id: StatusId,
    pub instructions: String,
    pub output_schema: serde_json::Value,
    pub session_state: serde_json::Value,
    pub live_stream_url: Option<String>,
    pub active_session_id: Option<String>,
    pub active_task_id: Option<TaskId>,
    pub task_claimed_at: Option<Timestamp>,
    pub last_result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub last_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let status = ProjectStatus::from_id(row.status_id).ok_or_else(|| StoreError::Corrupt {
            id: row.id,
            reason: format!("unknown status_id {}", row.status_id),
        })?;

        let live_session = match (row.live_stream_url, row.active_session_id) {
            (Some(url), Some(session_id)) => Some(LiveSessionRef::new(url, session_id)),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt {
                    id: row.id,
                    reason: "half-populated live session reference".to_string(),
                })
            }
        };

        Ok(Self {
            id: row.id,
            status,
            instructions: row.instructions,
            output_schema: OutputSchema::parse(Some(row.output_schema)).map_err(|e| {
                StoreError::Corrupt {
                    id: row.id,
                    reason: e.to_string(),
                }
            })?,
            session_state: SessionState::new(row.session_state),
            live_session,
            active_task_id: row.active_task_id,
            task_claimed_at: row.task_claimed_at,
            last_result: row.last_result,
            last_error: row.last_error,
            last_run_at: row.last_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
