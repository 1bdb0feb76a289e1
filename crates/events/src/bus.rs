//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out [`ProjectEvent`]s to any number of subscribers. It
//! is shared via `Arc<EventBus>` between the dispatcher and the workers.

use browserflow_core::status::ProjectStatus;
use browserflow_core::types::{ProjectId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ProjectEvent
// ---------------------------------------------------------------------------

/// Something that happened to a project.
///
/// Built with [`ProjectEvent::new`] and enriched with
/// [`with_status`](ProjectEvent::with_status) and
/// [`with_payload`](ProjectEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEvent {
    /// Dot-separated event name, e.g. `"project.blocked"`.
    pub event_type: String,

    pub project_id: ProjectId,

    /// Status the project was left in, when the event follows a transition.
    pub status: Option<ProjectStatus>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl ProjectEvent {
    pub fn new(event_type: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            event_type: event_type.into(),
            project_id,
            status: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use browserflow_events::bus::{EventBus, ProjectEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ProjectEvent::new("project.created", uuid::Uuid::new_v4()));
/// ```
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ProjectEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer wraps.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: ProjectEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
