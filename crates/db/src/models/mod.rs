//! Domain records as persisted by the State Store.

pub mod project;
pub mod status;
