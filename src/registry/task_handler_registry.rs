//! # Task Registry
//!
//! Typed lookup from `(resource type, task type)` to the handlers that do the real
//! provisioning work. Registration happens once at startup through [`TaskRegistryBuilder`],
//! which refuses to build when a key is registered twice or a required key has no run handler.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = TaskRegistry::builder()
//!     .register_with_wait(HandlerKey::new("VPC".into(), TaskType::Create), create_vpc, poll_vpc)
//!     .register(HandlerKey::new("VPC".into(), TaskType::Delete), delete_vpc)
//!     .require(HandlerKey::new("SUBNET".into(), TaskType::Create))
//!     .build()?; // fails: SUBNET/CREATE has no run handler
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::{ResourceType, Task, TaskType};
use crate::state_machine::TaskEvent;

/// Key for handler lookup in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerKey {
    pub resource_type: ResourceType,
    pub task_type: TaskType,
}

impl HandlerKey {
    pub fn new(resource_type: ResourceType, task_type: TaskType) -> Self {
        Self {
            resource_type,
            task_type,
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.task_type)
    }
}

/// What a handler reports back for its task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandlerOutcome {
    /// External operation finished
    Succeeded { resource_id: Option<String> },
    /// External operation still in progress; poll again with the wait handler
    AwaitExternal { resource_id: Option<String> },
    /// Handler decided the task failed
    Failed { message: String },
}

impl HandlerOutcome {
    pub fn succeeded() -> Self {
        Self::Succeeded { resource_id: None }
    }

    /// Task event recorded for this outcome
    pub fn into_event(self) -> TaskEvent {
        match self {
            Self::Succeeded { resource_id } => TaskEvent::Succeed { resource_id },
            Self::AwaitExternal { resource_id } => TaskEvent::AwaitExternal { resource_id },
            Self::Failed { message } => TaskEvent::Fail(message),
        }
    }
}

/// Externally supplied provisioning logic
///
/// Handlers only ever act on the task they are given. An `Err` (or a panic) fails the task
/// with the error text as its message.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> anyhow::Result<HandlerOutcome>;
}

/// Run handler plus the optional wait handler that polls a long-running operation
#[derive(Clone)]
pub struct TaskHandlers {
    pub run: Arc<dyn TaskHandler>,
    pub wait: Option<Arc<dyn TaskHandler>>,
}

impl fmt::Debug for TaskHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandlers")
            .field("has_wait", &self.wait.is_some())
            .finish()
    }
}

/// Builder validating registrations before the registry is handed to the engine
#[derive(Default)]
pub struct TaskRegistryBuilder {
    handlers: HashMap<HandlerKey, TaskHandlers>,
    duplicates: BTreeSet<HandlerKey>,
    required: BTreeSet<HandlerKey>,
}

impl TaskRegistryBuilder {
    pub fn register(self, key: HandlerKey, run: Arc<dyn TaskHandler>) -> Self {
        self.insert(key, TaskHandlers { run, wait: None })
    }

    pub fn register_with_wait(
        self,
        key: HandlerKey,
        run: Arc<dyn TaskHandler>,
        wait: Arc<dyn TaskHandler>,
    ) -> Self {
        self.insert(
            key,
            TaskHandlers {
                run,
                wait: Some(wait),
            },
        )
    }

    /// Key that must have a run handler for `build` to succeed
    pub fn require(mut self, key: HandlerKey) -> Self {
        self.required.insert(key);
        self
    }

    pub fn require_all(mut self, keys: impl IntoIterator<Item = HandlerKey>) -> Self {
        self.required.extend(keys);
        self
    }

    fn insert(mut self, key: HandlerKey, handlers: TaskHandlers) -> Self {
        if self.handlers.contains_key(&key) {
            self.duplicates.insert(key);
        } else {
            self.handlers.insert(key, handlers);
        }
        self
    }

    pub fn build(self) -> Result<TaskRegistry> {
        if !self.duplicates.is_empty() {
            let keys: Vec<String> = self.duplicates.iter().map(ToString::to_string).collect();
            return Err(EngineError::Validation(format!(
                "Duplicate handler registration: {}",
                keys.join(", ")
            )));
        }

        let missing: Vec<HandlerKey> = self
            .required
            .into_iter()
            .filter(|key| !self.handlers.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingHandlers(missing));
        }

        debug!(handlers = self.handlers.len(), "Task registry built");
        Ok(TaskRegistry {
            handlers: self.handlers,
        })
    }
}

/// Immutable handler table resolved at startup
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<HandlerKey, TaskHandlers>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    pub fn lookup(&self, key: &HandlerKey) -> Option<&TaskHandlers> {
        self.handlers.get(key)
    }

    pub fn run_handler(&self, key: &HandlerKey) -> Option<Arc<dyn TaskHandler>> {
        self.lookup(key).map(|handlers| Arc::clone(&handlers.run))
    }

    pub fn wait_handler(&self, key: &HandlerKey) -> Option<Arc<dyn TaskHandler>> {
        self.lookup(key).and_then(|handlers| handlers.wait.clone())
    }

    pub fn contains(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Sorted, de-duplicated keys of `tasks` with no run handler
    pub fn missing_run_handlers<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Vec<HandlerKey> {
        tasks
            .into_iter()
            .map(Task::handler_key)
            .filter(|key| !self.contains(key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Completeness check for a set of tasks about to be persisted
    pub fn ensure_covers<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Result<()> {
        let missing = self.missing_run_handlers(tasks);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::MissingHandlers(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Noop;

    #[async_trait]
    impl TaskHandler for Noop {
        async fn handle(&self, _task: &Task) -> anyhow::Result<HandlerOutcome> {
            Ok(HandlerOutcome::succeeded())
        }
    }

    fn key(resource: &str, task_type: TaskType) -> HandlerKey {
        HandlerKey::new(ResourceType::new(resource), task_type)
    }

    #[test]
    fn test_lookup_run_and_wait() {
        let registry = TaskRegistry::builder()
            .register_with_wait(key("VPC", TaskType::Create), Arc::new(Noop), Arc::new(Noop))
            .register(key("VPC", TaskType::Delete), Arc::new(Noop))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.wait_handler(&key("VPC", TaskType::Create)).is_some());
        assert!(registry.wait_handler(&key("VPC", TaskType::Delete)).is_none());
        assert!(registry.run_handler(&key("SUBNET", TaskType::Create)).is_none());
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = TaskRegistry::builder()
            .register(key("VPC", TaskType::Create), Arc::new(Noop))
            .register(key("VPC", TaskType::Create), Arc::new(Noop))
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("VPC/CREATE")));
    }

    #[test]
    fn test_build_rejects_missing_required_keys() {
        let err = TaskRegistry::builder()
            .register(key("VPC", TaskType::Create), Arc::new(Noop))
            .require_all([key("VPC", TaskType::Create), key("SUBNET", TaskType::Create)])
            .build()
            .unwrap_err();
        match err {
            EngineError::MissingHandlers(keys) => {
                assert_eq!(keys, vec![key("SUBNET", TaskType::Create)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_run_handlers_are_deduplicated() {
        let registry = TaskRegistry::builder()
            .register(key("VPC", TaskType::Create), Arc::new(Noop))
            .build()
            .unwrap();
        let workflow_id = Uuid::now_v7();
        let tasks = vec![
            Task::new(workflow_id, ResourceType::new("VPC"), TaskType::Create),
            Task::new(workflow_id, ResourceType::new("SUBNET"), TaskType::Create),
            Task::new(workflow_id, ResourceType::new("SUBNET"), TaskType::Create),
        ];

        assert_eq!(
            registry.missing_run_handlers(&tasks),
            vec![key("SUBNET", TaskType::Create)]
        );
        assert!(registry.ensure_covers(&tasks[..1]).is_ok());
    }

    #[test]
    fn test_outcome_maps_to_task_event() {
        assert_eq!(
            HandlerOutcome::Failed {
                message: "quota".to_string()
            }
            .into_event(),
            TaskEvent::Fail("quota".to_string())
        );
    }
}
