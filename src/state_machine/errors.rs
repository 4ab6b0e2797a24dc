use thiserror::Error;

/// Errors raised by the transition tables
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateMachineError {
    #[error("Invalid {entity} transition from {from} on event '{event}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: &'static str,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

pub(crate) fn invalid_transition(
    entity: &'static str,
    from: impl ToString,
    event: &'static str,
) -> StateMachineError {
    StateMachineError::InvalidTransition {
        entity,
        from: from.to_string(),
        event,
    }
}
