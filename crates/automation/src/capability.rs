//! The seam between the orchestrator and whatever actually drives the
//! browser.
//!
//! A capability receives one [`AutomationRequest`] per task and either
//! finishes it, hands it to a human ([`AutomationOutcome::Blocked`]), or
//! fails. Workers never retry a failed call.

use async_trait::async_trait;
use browserflow_core::schema::OutputSchema;
use browserflow_core::session::{LiveSessionRef, SessionState};
use browserflow_core::task::{AgentTask, TaskKind};
use browserflow_core::types::{ProjectId, TaskId};
use serde::Serialize;

/// One automation call.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationRequest {
    pub project_id: ProjectId,
    pub task_id: TaskId,
    /// Browser session to open, or to re-attach to for a continuation.
    pub session_id: String,
    pub kind: TaskKind,
    pub instructions: String,
    pub session_state: SessionState,
    pub output_schema: OutputSchema,
}

impl From<AgentTask> for AutomationRequest {
    fn from(task: AgentTask) -> Self {
        Self {
            project_id: task.project_id,
            task_id: task.task_id,
            session_id: task.session_id,
            kind: task.kind,
            instructions: task.instructions,
            session_state: task.session_state,
            output_schema: task.output_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutomationOutcome {
    /// The instructions ran to completion.
    Completed {
        output: serde_json::Value,
        /// Cookies captured at the end of the run; `None` keeps the old ones.
        session_state: Option<SessionState>,
    },
    /// Automated progress is impossible; the browser session stays open for
    /// a human.
    Blocked {
        session_state: Option<SessionState>,
        /// Where to watch the session. `None` keeps the reference assigned at
        /// dispatch.
        live_session: Option<LiveSessionRef>,
        reason: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The automation service returned a non-2xx status code.
    #[error("Automation API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The service answered with something we cannot interpret.
    #[error("Unexpected automation response: {0}")]
    Protocol(String),

    /// The service ran the instructions and reported a failure.
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait AutomationCapability: Send + Sync {
    async fn execute(
        &self,
        request: AutomationRequest,
    ) -> Result<AutomationOutcome, CapabilityError>;
}
