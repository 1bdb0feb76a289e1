//! Browser automation capability.
//!
//! The orchestrator treats the browser as a black box behind
//! [`AutomationCapability`]. Two implementations ship here: an HTTP client
//! for a remote automation service and a simulated one for local use.

pub mod api;
pub mod capability;
pub mod simulated;

pub use api::HttpAutomationClient;
pub use capability::{AutomationCapability, AutomationOutcome, AutomationRequest, CapabilityError};
pub use simulated::SimulatedCapability;
