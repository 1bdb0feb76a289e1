//! Event type names published on the project event bus.

/// A project was created and promoted to IDLE.
pub const EVENT_PROJECT_CREATED: &str = "project.created";

/// A project's definition (instructions / output schema) was edited.
pub const EVENT_PROJECT_UPDATED: &str = "project.updated";

/// A run task was enqueued and the project moved to RUNNING.
pub const EVENT_PROJECT_RUN_DISPATCHED: &str = "project.run_dispatched";

/// A continuation task was enqueued for a BLOCKED project.
pub const EVENT_PROJECT_CONTINUED: &str = "project.continued";

/// A running project was stopped by the operator.
pub const EVENT_PROJECT_STOPPED: &str = "project.stopped";

/// The automation finished successfully.
pub const EVENT_PROJECT_COMPLETED: &str = "project.completed";

/// The automation needs a human; the live session is preserved.
pub const EVENT_PROJECT_BLOCKED: &str = "project.blocked";

/// The automation failed or timed out; the project is back to IDLE.
pub const EVENT_PROJECT_FAILED: &str = "project.failed";

/// The project record was removed.
pub const EVENT_PROJECT_DELETED: &str = "project.deleted";
