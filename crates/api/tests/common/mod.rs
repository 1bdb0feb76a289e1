//! Shared setup for API integration tests: the production router over an
//! in-memory store and queue, with tasks executed by hand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use browserflow_api::config::ServerConfig;
use browserflow_api::router::build_app_router;
use browserflow_api::state::AppState;
use browserflow_automation::{
    AutomationCapability, AutomationOutcome, AutomationRequest, CapabilityError,
};
use browserflow_core::session::{LiveSessionRef, SessionState};
use browserflow_db::{InMemoryProjectStore, InMemoryTaskQueue, TaskQueue};
use browserflow_engine::{CancelRegistry, Dispatcher, ExecutionReport, TaskExecutor};
use browserflow_events::EventBus;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        embedded_workers: false,
    }
}

// ---------------------------------------------------------------------------
// Stub automation
// ---------------------------------------------------------------------------

/// Replies with queued outcomes, then `{"ok": true}` completions.
#[derive(Default)]
pub struct StubCapability {
    replies: Mutex<VecDeque<AutomationOutcome>>,
}

impl StubCapability {
    pub fn block_on(&self, session_id: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(AutomationOutcome::Blocked {
                session_state: Some(SessionState::new(serde_json::json!({"sid": "secret"}))),
                live_session: Some(LiveSessionRef::new(
                    format!("https://stream/{session_id}"),
                    session_id,
                )),
                reason: Some("captcha".into()),
            });
    }
}

#[async_trait]
impl AutomationCapability for StubCapability {
    async fn execute(
        &self,
        _request: AutomationRequest,
    ) -> Result<AutomationOutcome, CapabilityError> {
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or(AutomationOutcome::Completed {
            output: serde_json::json!({"ok": true}),
            session_state: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Test app
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub queue: Arc<InMemoryTaskQueue>,
    pub executor: Arc<TaskExecutor>,
    pub capability: Arc<StubCapability>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_queue_capacity(16)
    }

    pub fn with_queue_capacity(capacity: usize) -> Self {
        let config = test_config();
        let store = Arc::new(InMemoryProjectStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new(capacity));
        let events = Arc::new(EventBus::default());
        let cancels = Arc::new(CancelRegistry::new());
        let capability = Arc::new(StubCapability::default());

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            Arc::clone(&cancels),
            Arc::clone(&events),
            "https://stream/{session_id}",
        ));
        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            capability.clone(),
            cancels,
            events,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ));

        let state = AppState { dispatcher, store };

        Self {
            router: build_app_router(state, &config),
            queue,
            executor,
            capability,
        }
    }

    /// Dequeue and execute the next queued task.
    pub async fn work_one(&self) -> ExecutionReport {
        let task = tokio::time::timeout(Duration::from_secs(5), self.queue.dequeue())
            .await
            .expect("a task should be queued")
            .unwrap()
            .expect("queue should be open");
        self.executor.execute(self.queue.as_ref(), task).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(json_request(Method::POST, uri, body)).await
    }

    pub async fn patch_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(json_request(Method::PATCH, uri, body)).await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Create a project and return its id.
    pub async fn create_project(&self, instructions: &str) -> String {
        let response = self
            .post_json(
                "/api/v1/projects",
                serde_json::json!({ "instructions": instructions }),
            )
            .await;
        let json = body_json(response).await;
        json["data"]["id"].as_str().unwrap().to_string()
    }
}

fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
