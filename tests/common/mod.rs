//! Shared fixtures for the integration suites: scripted handlers, misbehaving dispatchers and a
//! harness wiring the reconciler and scheduler to an in-memory store.
#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use provisioner_core::events::EventPublisher;
use provisioner_core::messaging::{DispatchError, Dispatcher, Job, RecordingDispatcher};
use provisioner_core::models::{ResourceType, Task, TaskType};
use provisioner_core::orchestration::{TickOutcome, TickReport, WorkflowExecutor, WorkflowManager};
use provisioner_core::registry::{HandlerKey, HandlerOutcome, TaskHandler, TaskRegistry};
use provisioner_core::state_machine::{TaskStatus, WorkflowStatus};
use provisioner_core::store::{MemoryWorkflowStore, TaskUpdate, WorkflowStore};

pub fn key(resource: &str, task_type: TaskType) -> HandlerKey {
    HandlerKey::new(ResourceType::new(resource), task_type)
}

/// Handler returning the same outcome every call
pub struct ScriptedHandler {
    outcome: std::result::Result<HandlerOutcome, String>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn succeed(resource_id: &str) -> Arc<Self> {
        Self::with(Ok(HandlerOutcome::Succeeded {
            resource_id: Some(resource_id.to_string()),
        }))
    }

    pub fn await_external(resource_id: &str) -> Arc<Self> {
        Self::with(Ok(HandlerOutcome::AwaitExternal {
            resource_id: Some(resource_id.to_string()),
        }))
    }

    pub fn fail(message: &str) -> Arc<Self> {
        Self::with(Ok(HandlerOutcome::Failed {
            message: message.to_string(),
        }))
    }

    /// Handler returning `Err`
    pub fn error(message: &str) -> Arc<Self> {
        Self::with(Err(message.to_string()))
    }

    fn with(outcome: std::result::Result<HandlerOutcome, String>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn handle(&self, _task: &Task) -> anyhow::Result<HandlerOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(anyhow::anyhow!(message.clone())),
        }
    }
}

pub struct PanickingHandler;

#[async_trait]
impl TaskHandler for PanickingHandler {
    async fn handle(&self, _task: &Task) -> anyhow::Result<HandlerOutcome> {
        panic!("handler blew up");
    }
}

/// Dispatcher rejecting every job
pub struct FailingDispatcher;

#[async_trait]
impl Dispatcher for FailingDispatcher {
    async fn dispatch(&self, job: Job) -> std::result::Result<(), DispatchError> {
        Err(DispatchError::rejected(job.name(), "queue unavailable"))
    }
}

pub struct PanickingDispatcher;

#[async_trait]
impl Dispatcher for PanickingDispatcher {
    async fn dispatch(&self, _job: Job) -> std::result::Result<(), DispatchError> {
        panic!("dispatcher blew up");
    }
}

/// Registry with a succeeding run handler for each key
pub fn registry_for(keys: &[HandlerKey]) -> TaskRegistry {
    keys.iter()
        .fold(TaskRegistry::builder(), |builder, key| {
            builder.register(key.clone(), ScriptedHandler::succeed("res"))
        })
        .build()
        .expect("registry should build")
}

/// Reconciler and scheduler over a memory store and a recording dispatcher
pub struct Harness {
    pub store: Arc<MemoryWorkflowStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub events: EventPublisher,
    pub executor: WorkflowExecutor,
    pub manager: WorkflowManager,
}

impl Harness {
    pub fn new(registry: TaskRegistry) -> Self {
        Self::with_dispatcher(registry, None)
    }

    /// Harness whose reconciler dispatches through `dispatcher` instead of the recorder
    pub fn with_dispatcher(registry: TaskRegistry, dispatcher: Option<Arc<dyn Dispatcher>>) -> Self {
        let store = Arc::new(MemoryWorkflowStore::new());
        let recorder = Arc::new(RecordingDispatcher::new());
        let events = EventPublisher::default();
        let outbound: Arc<dyn Dispatcher> =
            dispatcher.unwrap_or_else(|| Arc::clone(&recorder) as Arc<dyn Dispatcher>);

        let executor = WorkflowExecutor::new(
            Arc::clone(&store) as Arc<dyn WorkflowStore>,
            Arc::new(registry),
            outbound,
            events.clone(),
        )
        .with_release_attempts(1);
        let manager = WorkflowManager::new(
            Arc::clone(&store) as Arc<dyn WorkflowStore>,
            Arc::clone(&recorder) as Arc<dyn Dispatcher>,
            events.clone(),
        );

        Self {
            store,
            dispatcher: recorder,
            events,
            executor,
            manager,
        }
    }

    /// Move a PENDING workflow to INITIATED as the scheduler would
    pub async fn initiate(&self, workflow_id: Uuid) {
        assert!(self
            .store
            .transition_workflow_status(workflow_id, WorkflowStatus::Pending, WorkflowStatus::Initiated)
            .await
            .unwrap());
    }

    /// Run one tick and return its report
    pub async fn tick(&self, workflow_id: Uuid) -> TickReport {
        match self.executor.execute(workflow_id).await.unwrap() {
            TickOutcome::Advanced(report) => report,
            other => panic!("expected an advanced tick, got {other:?}"),
        }
    }

    /// Stand-in for a handler finishing: force the task into `status`
    pub async fn set_task_status(&self, task_id: Uuid, status: TaskStatus) {
        let task = self.task(task_id).await;
        assert!(self
            .store
            .update_task_if_status(task_id, task.status, &TaskUpdate::status(status))
            .await
            .unwrap());
    }

    pub async fn task(&self, task_id: Uuid) -> Task {
        self.store.find_task(task_id).await.unwrap().expect("task exists")
    }

    pub async fn workflow_status(&self, workflow_id: Uuid) -> WorkflowStatus {
        self.store
            .find_workflow(workflow_id)
            .await
            .unwrap()
            .expect("workflow exists")
            .status
    }

    pub async fn executor_running(&self, workflow_id: Uuid) -> bool {
        self.store
            .find_workflow(workflow_id)
            .await
            .unwrap()
            .expect("workflow exists")
            .executor_running
    }
}
