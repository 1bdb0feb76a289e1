//! Domain vocabulary shared by every browserflow crate.
//!
//! Pure types and validation only: no I/O, no internal dependencies.

pub mod error;
pub mod outcome;
pub mod project;
pub mod project_events;
pub mod schema;
pub mod session;
pub mod status;
pub mod task;
pub mod types;
