use crate::status::ProjectStatus;
use crate::types::ProjectId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: ProjectId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The command is incompatible with the project's current status.
    /// Callers recover by re-reading the project.
    #[error("Cannot {action} project {id} while it is {status}")]
    InvalidState {
        id: ProjectId,
        status: ProjectStatus,
        action: &'static str,
    },

    /// A concurrent transition won the compare-and-swap.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The task queue refused new work.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
