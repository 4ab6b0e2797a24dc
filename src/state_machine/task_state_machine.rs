use super::{
    errors::{invalid_transition, StateMachineResult},
    events::TaskEvent,
    states::TaskStatus,
};

/// Transition table for task statuses
///
/// Stateless: callers read the current status from the store, compute the target here and
/// apply it with a compare-and-set on the status they read.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target status for `event` applied in `current`
    pub fn determine_target_state(
        current: TaskStatus,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskStatus> {
        use TaskStatus::*;

        let target = match (current, event) {
            (Pending, TaskEvent::Initiate) => Initiated,
            (Initiated, TaskEvent::Begin) => Running,

            (Initiated | Running | RunningWaitInitiated, TaskEvent::AwaitExternal { .. }) => {
                RunningWait
            }
            (RunningWait, TaskEvent::InitiateWait) => RunningWaitInitiated,
            (RunningWaitInitiated, TaskEvent::BeginWait) => Running,

            (Initiated | Running | RunningWaitInitiated, TaskEvent::Succeed { .. }) => Successful,

            (from, TaskEvent::Fail(_)) if !from.is_terminal() => Failed,

            (Initiated, TaskEvent::RevertDispatch) => Pending,
            (RunningWaitInitiated, TaskEvent::RevertDispatch) => RunningWait,

            (from, event) => {
                return Err(invalid_transition("task", from, event.event_type()));
            }
        };

        Ok(target)
    }

    /// Whether `event` is accepted in `current`
    pub fn can_transition(current: TaskStatus, event: &TaskEvent) -> bool {
        Self::determine_target_state(current, event).is_ok()
    }
}
