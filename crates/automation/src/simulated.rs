//! Stand-in capability used when no automation service is configured.

use std::time::Duration;

use async_trait::async_trait;

use crate::capability::{
    AutomationCapability, AutomationOutcome, AutomationRequest, CapabilityError,
};

/// Default time a simulated run takes.
pub const DEFAULT_SIMULATION_DELAY: Duration = Duration::from_secs(10);

/// Sleeps for a fixed delay and reports success. Keeps the existing
/// session state.
#[derive(Debug, Clone)]
pub struct SimulatedCapability {
    delay: Duration,
}

impl SimulatedCapability {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedCapability {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATION_DELAY)
    }
}

#[async_trait]
impl AutomationCapability for SimulatedCapability {
    async fn execute(
        &self,
        request: AutomationRequest,
    ) -> Result<AutomationOutcome, CapabilityError> {
        tracing::info!(
            project_id = %request.project_id,
            task_id = %request.task_id,
            delay_secs = self.delay.as_secs_f64(),
            "Simulating automation run"
        );
        tokio::time::sleep(self.delay).await;

        Ok(AutomationOutcome::Completed {
            output: serde_json::json!({
                "simulated": true,
                "session_id": request.session_id,
                "message": "Task completed in simulation mode",
            }),
            session_state: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use browserflow_core::schema::OutputSchema;
    use browserflow_core::session::SessionState;
    use browserflow_core::task::TaskKind;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completes_after_delay() {
        let capability = SimulatedCapability::new(Duration::from_secs(10));
        let started = tokio::time::Instant::now();

        let outcome = capability
            .execute(AutomationRequest {
                project_id: uuid::Uuid::new_v4(),
                task_id: uuid::Uuid::new_v4(),
                session_id: "sess-1".into(),
                kind: TaskKind::Run,
                instructions: "collect invoices".into(),
                session_state: SessionState::empty(),
                output_schema: OutputSchema::empty(),
            })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        match outcome {
            AutomationOutcome::Completed { output, session_state } => {
                assert_eq!(output["simulated"], true);
                assert_eq!(output["session_id"], "sess-1");
                assert!(session_state.is_none());
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }
}
