//! The unit of work carried by the task queue from the dispatcher to a
//! worker.

use serde::{Deserialize, Serialize};

use crate::schema::OutputSchema;
use crate::session::SessionState;
use crate::types::{ProjectId, TaskId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A fresh run started from IDLE.
    Run,
    /// Agent work handed back after a human dealt with a BLOCKED session.
    /// Re-attaches to the preserved browser session.
    Continue,
}

/// Everything a worker needs to drive one automation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub kind: TaskKind,
    /// External browser session the capability should open or re-attach to.
    pub session_id: String,
    pub instructions: String,
    pub session_state: SessionState,
    pub output_schema: OutputSchema,
    pub enqueued_at: Timestamp,
}
