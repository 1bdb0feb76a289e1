//! Project event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ProjectEvent`]: the event envelope published on every lifecycle
//!   transition.
//! - [`EventLogger`]: background consumer that traces every event.

pub mod bus;
pub mod logger;

pub use bus::{EventBus, ProjectEvent};
pub use logger::EventLogger;
