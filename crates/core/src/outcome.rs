//! Failure reasons recorded on a project after an asynchronous run.
//!
//! These never reach the caller of `run`; they land in the project's
//! `last_error` and the project returns to IDLE.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunFailure {
    /// The automation call itself failed. Never retried automatically.
    #[error("Automation failed: {0}")]
    Capability(String),

    /// The automation did not answer within the task time limit.
    #[error("Automation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The worker holding the task disappeared before reporting.
    #[error("Task abandoned: {0}")]
    Abandoned(String),
}
