//! Shared harness for engine integration tests: in-memory store and queue,
//! a scripted automation capability, and helpers to step tasks by hand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use browserflow_automation::{
    AutomationCapability, AutomationOutcome, AutomationRequest, CapabilityError,
};
use browserflow_core::project::NewProject;
use browserflow_core::session::{LiveSessionRef, SessionState};
use browserflow_core::task::AgentTask;
use browserflow_db::models::project::Project;
use browserflow_db::{InMemoryProjectStore, InMemoryTaskQueue, TaskQueue};
use browserflow_engine::{CancelRegistry, Dispatcher, ExecutionReport, TaskExecutor};
use browserflow_events::EventBus;
use tokio::sync::{oneshot, Notify};

pub const STREAM_TEMPLATE: &str = "https://stream/{session_id}";

// ---------------------------------------------------------------------------
// Scripted capability
// ---------------------------------------------------------------------------

/// What the next automation call does.
pub enum Step {
    Reply(Result<AutomationOutcome, String>),
    /// Wait for the test to release an outcome.
    Gate(oneshot::Receiver<AutomationOutcome>),
    /// Never answer.
    Hang,
    /// Panic inside the call.
    Crash,
}

#[derive(Default)]
pub struct ScriptedCapability {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<AutomationRequest>>,
    started: Notify,
}

impl ScriptedCapability {
    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn complete_with(&self, output: serde_json::Value, cookies: Option<serde_json::Value>) {
        self.push(Step::Reply(Ok(AutomationOutcome::Completed {
            output,
            session_state: cookies.map(SessionState::new),
        })));
    }

    pub fn block_on(&self, session_id: &str) {
        self.push(Step::Reply(Ok(AutomationOutcome::Blocked {
            session_state: Some(SessionState::new(serde_json::json!({"sid": "captcha"}))),
            live_session: Some(LiveSessionRef::new(
                format!("https://stream/{session_id}"),
                session_id,
            )),
            reason: Some("captcha".into()),
        })));
    }

    pub fn fail_with(&self, message: &str) {
        self.push(Step::Reply(Err(message.to_string())));
    }

    /// Queue a gated step and return the handle that releases it.
    pub fn gate(&self) -> oneshot::Sender<AutomationOutcome> {
        let (tx, rx) = oneshot::channel();
        self.push(Step::Gate(rx));
        tx
    }

    pub fn requests(&self) -> Vec<AutomationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Resolves once a call has reached the capability.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

#[async_trait]
impl AutomationCapability for ScriptedCapability {
    async fn execute(
        &self,
        request: AutomationRequest,
    ) -> Result<AutomationOutcome, CapabilityError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();
        self.started.notify_one();

        match step {
            None => Ok(AutomationOutcome::Completed {
                output: serde_json::json!({"ok": true}),
                session_state: None,
            }),
            Some(Step::Reply(reply)) => reply.map_err(CapabilityError::Failed),
            Some(Step::Gate(rx)) => rx
                .await
                .map_err(|_| CapabilityError::Failed("gate dropped".into())),
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Crash) => panic!("automation engine crashed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct HarnessOptions {
    pub queue_capacity: usize,
    pub task_timeout: Duration,
    pub cancel_poll_interval: Duration,
    /// Give the worker its own cancel registry, as if it ran in another
    /// process.
    pub separate_worker: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            task_timeout: Duration::from_secs(30 * 60),
            cancel_poll_interval: Duration::from_secs(3600),
            separate_worker: false,
        }
    }
}

pub struct Harness {
    pub store: Arc<InMemoryProjectStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub events: Arc<EventBus>,
    pub capability: Arc<ScriptedCapability>,
    pub dispatcher: Arc<Dispatcher>,
    pub executor: Arc<TaskExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let store = Arc::new(InMemoryProjectStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new(options.queue_capacity));
        let events = Arc::new(EventBus::default());
        let capability = Arc::new(ScriptedCapability::default());
        let cancels = Arc::new(CancelRegistry::new());
        let worker_cancels = if options.separate_worker {
            Arc::new(CancelRegistry::new())
        } else {
            Arc::clone(&cancels)
        };

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            cancels,
            Arc::clone(&events),
            STREAM_TEMPLATE,
        ));
        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            capability.clone(),
            worker_cancels,
            Arc::clone(&events),
            options.task_timeout,
            options.cancel_poll_interval,
        ));

        Self {
            store,
            queue,
            events,
            capability,
            dispatcher,
            executor,
        }
    }

    pub async fn create(&self, instructions: &str) -> Project {
        self.dispatcher
            .create(NewProject {
                instructions: instructions.to_string(),
                output_schema: Some(serde_json::json!({"type": "object"})),
            })
            .await
            .unwrap()
    }

    /// The next queued task. Panics if nothing arrives promptly.
    pub async fn next_task(&self) -> AgentTask {
        tokio::time::timeout(Duration::from_secs(5), self.queue.dequeue())
            .await
            .expect("a task should be queued")
            .unwrap()
            .expect("queue should be open")
    }

    /// Whether the queue is empty right now.
    pub async fn queue_is_empty(&self) -> bool {
        tokio::time::timeout(Duration::from_millis(50), self.queue.dequeue())
            .await
            .is_err()
    }

    pub async fn execute(&self, task: AgentTask) -> ExecutionReport {
        self.executor.execute(self.queue.as_ref(), task).await
    }

    /// Dequeue and execute the next task.
    pub async fn step(&self) -> ExecutionReport {
        let task = self.next_task().await;
        self.execute(task).await
    }
}
