use serde::{Deserialize, Serialize};

/// Events that can trigger task status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Reconciler found the task ready and is dispatching its run handler
    Initiate,
    /// Worker picked up the run handler
    Begin,
    /// Run or wait handler returned while the external operation is still in progress
    AwaitExternal { resource_id: Option<String> },
    /// Reconciler is dispatching the wait handler
    InitiateWait,
    /// Worker picked up the wait handler
    BeginWait,
    /// Handler finished successfully
    Succeed { resource_id: Option<String> },
    /// Handler (or the reconciler) failed the task
    Fail(String),
    /// Enqueue of the handler job failed; undo the dispatch marker
    RevertDispatch,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Initiate => "initiate",
            Self::Begin => "begin",
            Self::AwaitExternal { .. } => "await_external",
            Self::InitiateWait => "initiate_wait",
            Self::BeginWait => "begin_wait",
            Self::Succeed { .. } => "succeed",
            Self::Fail(_) => "fail",
            Self::RevertDispatch => "revert_dispatch",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Resource id reported by the handler, if any
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::AwaitExternal { resource_id } | Self::Succeed { resource_id } => {
                resource_id.as_deref()
            }
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    pub fn succeed() -> Self {
        Self::Succeed { resource_id: None }
    }
}

/// Events that can trigger workflow status transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkflowEvent {
    /// Scheduler picked the workflow
    Initiate,
    /// First reconciler tick
    Start,
    /// No task in flight any more
    Finish { failed: bool, callbacks_pending: bool },
    /// Every released callback workflow reached a final status
    CallbacksResolved,
    /// Parent finished with the outcome this callback waits for
    Release,
}

impl WorkflowEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Initiate => "initiate",
            Self::Start => "start",
            Self::Finish { .. } => "finish",
            Self::CallbacksResolved => "callbacks_resolved",
            Self::Release => "release",
        }
    }
}
