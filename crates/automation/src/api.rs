//! REST client for a remote browser-automation service.
//!
//! Sends `POST {base_url}/sessions/{session_id}/run` with the request as
//! JSON and maps the reply onto an [`AutomationOutcome`].

use async_trait::async_trait;
use browserflow_core::session::{LiveSessionRef, SessionState};
use serde::Deserialize;

use crate::capability::{
    AutomationCapability, AutomationOutcome, AutomationRequest, CapabilityError,
};

/// HTTP client for the automation service.
#[derive(Debug, Clone)]
pub struct HttpAutomationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Body returned by the `run` endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResponse {
    Completed {
        #[serde(default)]
        output: serde_json::Value,
        #[serde(default)]
        session_state: Option<SessionState>,
    },
    Blocked {
        #[serde(default)]
        session_state: Option<SessionState>,
        #[serde(default)]
        live_stream_url: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl RunResponse {
    /// Resolve the reply for the session that was requested.
    ///
    /// A blocked reply without a session id refers to `requested_session`.
    pub fn into_outcome(self, requested_session: &str) -> Result<AutomationOutcome, CapabilityError> {
        match self {
            RunResponse::Completed {
                output,
                session_state,
            } => Ok(AutomationOutcome::Completed {
                output,
                session_state,
            }),
            RunResponse::Blocked {
                session_state,
                live_stream_url,
                session_id,
                reason,
            } => {
                let live_session = match (live_stream_url, session_id) {
                    (Some(url), Some(id)) => Some(LiveSessionRef::new(url, id)),
                    (Some(url), None) => Some(LiveSessionRef::new(url, requested_session)),
                    (None, None) => None,
                    (None, Some(id)) if id == requested_session => None,
                    (None, Some(id)) => {
                        return Err(CapabilityError::Protocol(format!(
                            "blocked on session {id} without a stream url"
                        )))
                    }
                };
                Ok(AutomationOutcome::Blocked {
                    session_state,
                    live_session,
                    reason,
                })
            }
            RunResponse::Failed { error } => Err(CapabilityError::Failed(error)),
        }
    }
}

impl HttpAutomationClient {
    /// * `base_url` - e.g. `http://automation:8080`, without trailing slash.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CapabilityError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CapabilityError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CapabilityError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CapabilityError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl AutomationCapability for HttpAutomationClient {
    async fn execute(
        &self,
        request: AutomationRequest,
    ) -> Result<AutomationOutcome, CapabilityError> {
        let url = format!("{}/sessions/{}/run", self.base_url, request.session_id);
        tracing::debug!(
            project_id = %request.project_id,
            task_id = %request.task_id,
            session_id = %request.session_id,
            "Calling automation service"
        );

        let mut builder = self.client.post(url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        Self::parse_response::<RunResponse>(response)
            .await?
            .into_outcome(&request.session_id)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::routing::post;
    use axum::{Json, Router};
    use browserflow_core::schema::OutputSchema;
    use browserflow_core::task::TaskKind;
    use serde_json::json;

    use super::*;

    fn parse(body: serde_json::Value) -> RunResponse {
        serde_json::from_value(body).unwrap()
    }

    fn request() -> AutomationRequest {
        AutomationRequest {
            project_id: uuid::Uuid::new_v4(),
            task_id: uuid::Uuid::new_v4(),
            session_id: "sess-42".into(),
            kind: TaskKind::Run,
            instructions: "collect invoices".into(),
            session_state: SessionState::empty(),
            output_schema: OutputSchema::empty(),
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn completed_reply_maps_to_completed() {
        let outcome = parse(json!({
            "status": "completed",
            "output": {"invoices": 3},
            "session_state": {"sid": "abc"}
        }))
        .into_outcome("sess-42")
        .unwrap();

        assert_eq!(
            outcome,
            AutomationOutcome::Completed {
                output: json!({"invoices": 3}),
                session_state: Some(SessionState::new(json!({"sid": "abc"}))),
            }
        );
    }

    #[test]
    fn blocked_reply_defaults_to_requested_session() {
        let outcome = parse(json!({
            "status": "blocked",
            "live_stream_url": "https://stream/sess-42",
            "reason": "captcha"
        }))
        .into_outcome("sess-42")
        .unwrap();

        assert_matches!(
            outcome,
            AutomationOutcome::Blocked { live_session: Some(live), reason: Some(reason), .. }
                if live == LiveSessionRef::new("https://stream/sess-42", "sess-42") && reason == "captcha"
        );
    }

    #[test]
    fn blocked_on_foreign_session_without_url_is_protocol_error() {
        let result = parse(json!({"status": "blocked", "session_id": "other"})).into_outcome("sess-42");
        assert_matches!(result, Err(CapabilityError::Protocol(_)));
    }

    #[test]
    fn failed_reply_is_an_error() {
        let result = parse(json!({"status": "failed", "error": "element not found"}))
            .into_outcome("sess-42");
        assert_matches!(result, Err(CapabilityError::Failed(msg)) if msg == "element not found");
    }

    #[tokio::test]
    async fn posts_to_session_endpoint() {
        let router = Router::new().route(
            "/sessions/{session_id}/run",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(json!({"status": "completed", "output": {"echo": body["instructions"]}}))
            }),
        );
        let client = HttpAutomationClient::new(serve(router).await, Some("key".into()));

        let outcome = client.execute(request()).await.unwrap();

        assert_matches!(
            outcome,
            AutomationOutcome::Completed { output, .. } if output["echo"] == "collect invoices"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let router = Router::new().route(
            "/sessions/{session_id}/run",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "browser pool exhausted") }),
        );
        let client = HttpAutomationClient::new(serve(router).await, None);

        assert_matches!(
            client.execute(request()).await,
            Err(CapabilityError::Api { status: 502, body }) if body == "browser pool exhausted"
        );
    }
}
