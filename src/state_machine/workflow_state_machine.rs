use super::{
    errors::{invalid_transition, StateMachineResult},
    events::WorkflowEvent,
    states::WorkflowStatus,
};

/// Transition table for workflow statuses
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowStateMachine;

impl WorkflowStateMachine {
    /// Determine the target status for `event` applied in `current`
    pub fn determine_target_state(
        current: WorkflowStatus,
        event: WorkflowEvent,
    ) -> StateMachineResult<WorkflowStatus> {
        use WorkflowStatus::*;

        let target = match (current, event) {
            (Pending, WorkflowEvent::Initiate) => Initiated,
            (Initiated, WorkflowEvent::Start) => Running,
            (
                Running,
                WorkflowEvent::Finish {
                    failed,
                    callbacks_pending,
                },
            ) => WorkflowStatus::completed(failed, callbacks_pending),
            (CompletedSuccessfullyWithCallbacksPending, WorkflowEvent::CallbacksResolved) => {
                CompletedSuccessfully
            }
            (CompletedWithFailureWithCallbacksPending, WorkflowEvent::CallbacksResolved) => {
                CompletedWithFailure
            }
            (OnHold, WorkflowEvent::Release) => Pending,
            (from, event) => {
                return Err(invalid_transition("workflow", from, event.event_type()));
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let initiated =
            WorkflowStateMachine::determine_target_state(WorkflowStatus::Pending, WorkflowEvent::Initiate)
                .unwrap();
        assert_eq!(initiated, WorkflowStatus::Initiated);

        let running =
            WorkflowStateMachine::determine_target_state(initiated, WorkflowEvent::Start).unwrap();
        assert_eq!(running, WorkflowStatus::Running);

        let finished = WorkflowStateMachine::determine_target_state(
            running,
            WorkflowEvent::Finish {
                failed: true,
                callbacks_pending: true,
            },
        )
        .unwrap();
        assert_eq!(finished, WorkflowStatus::CompletedWithFailureWithCallbacksPending);

        assert_eq!(
            WorkflowStateMachine::determine_target_state(finished, WorkflowEvent::CallbacksResolved)
                .unwrap(),
            WorkflowStatus::CompletedWithFailure
        );
    }

    #[test]
    fn test_callback_release() {
        assert_eq!(
            WorkflowStateMachine::determine_target_state(WorkflowStatus::OnHold, WorkflowEvent::Release)
                .unwrap(),
            WorkflowStatus::Pending
        );
        assert!(
            WorkflowStateMachine::determine_target_state(WorkflowStatus::Pending, WorkflowEvent::Release)
                .is_err()
        );
    }

    #[test]
    fn test_final_statuses_are_sticky() {
        for status in [
            WorkflowStatus::CompletedSuccessfully,
            WorkflowStatus::CompletedWithFailure,
        ] {
            assert!(WorkflowStateMachine::determine_target_state(status, WorkflowEvent::Start).is_err());
            assert!(WorkflowStateMachine::determine_target_state(
                status,
                WorkflowEvent::CallbacksResolved
            )
            .is_err());
        }
    }

    #[test]
    fn test_on_hold_cannot_be_initiated_directly() {
        assert!(
            WorkflowStateMachine::determine_target_state(WorkflowStatus::OnHold, WorkflowEvent::Initiate)
                .is_err()
        );
    }
}
