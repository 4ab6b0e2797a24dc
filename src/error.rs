//! Error types for the provisioning engine.
//!
//! Each boundary owns a narrow error enum ([`StoreError`], [`DispatchError`],
//! [`StateMachineError`], [`ConfigurationError`]); [`EngineError`] is the umbrella
//! type returned by the orchestration entry points.

use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigurationError;
use crate::messaging::DispatchError;
use crate::registry::HandlerKey;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),
    #[error("No run handler registered for: {}", format_keys(.0))]
    MissingHandlers(Vec<HandlerKey>),
    #[error("Dependency cycle detected through task '{0}'")]
    CycleDetected(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_keys(keys: &[HandlerKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceType, TaskType};

    #[test]
    fn test_missing_handlers_message_lists_keys() {
        let err = EngineError::MissingHandlers(vec![
            HandlerKey::new(ResourceType::new("VPC"), TaskType::Create),
            HandlerKey::new(ResourceType::new("SUBNET"), TaskType::Delete),
        ]);
        assert_eq!(
            err.to_string(),
            "No run handler registered for: VPC/CREATE, SUBNET/DELETE"
        );
    }
}
