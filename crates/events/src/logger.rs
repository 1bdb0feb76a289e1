//! Background consumer that writes every project event to the log.
//!
//! Runs until the [`EventBus`](crate::bus::EventBus) is dropped.

use tokio::sync::broadcast;

use crate::bus::ProjectEvent;

pub struct EventLogger;

impl EventLogger {
    pub async fn run(mut receiver: broadcast::Receiver<ProjectEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = %event.event_type,
                        project_id = %event.project_id,
                        status = ?event.status,
                        payload = %event.payload,
                        "Project event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
    }
}
