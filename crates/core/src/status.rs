//! Project lifecycle status and the transition table.
//!
//! ```text
//! INITIALIZING ──> IDLE ──run──> RUNNING ──success/stop/error──> IDLE
//!                                  │  ▲
//!                          blocked │  │ continue
//!                                  ▼  │
//!                                 BLOCKED
//! ```
//!
//! Every other pair is rejected. Deletion is a lifecycle end, not a status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Initializing,
    Idle,
    Running,
    Blocked,
}

impl ProjectStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Initializing,
        ProjectStatus::Idle,
        ProjectStatus::Running,
        ProjectStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Initializing => "INITIALIZING",
            ProjectStatus::Idle => "IDLE",
            ProjectStatus::Running => "RUNNING",
            ProjectStatus::Blocked => "BLOCKED",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    pub fn can_transition_to(self, to: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, to),
            (Initializing, Idle)
                | (Idle, Running)
                | (Running, Idle)
                | (Running, Blocked)
                | (Blocked, Running)
        )
    }

    /// A live session reference must be present exactly in these states.
    pub fn holds_live_session(self) -> bool {
        matches!(self, ProjectStatus::Running | ProjectStatus::Blocked)
    }

    /// Deletion is refused only while a task is outstanding.
    pub fn is_deletable(self) -> bool {
        self != ProjectStatus::Running
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown project status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ProjectStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}
