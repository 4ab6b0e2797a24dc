use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status definitions
///
/// A task is created `Pending`, dispatched by the reconciler (`Initiated`), picked up by its
/// run handler (`Running`) and either finishes or parks itself in `RunningWait` while an
/// external long-running operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created with the workflow, waiting for its predecessors
    #[default]
    Pending,
    /// Run handler dispatched, not yet picked up
    Initiated,
    /// Run handler executing
    Running,
    /// Run handler returned, external operation still in progress
    RunningWait,
    /// Wait handler dispatched to poll the external operation
    RunningWaitInitiated,
    /// Finished successfully
    Successful,
    /// Finished with an error
    Failed,
}

impl TaskStatus {
    /// Terminal statuses are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// Whether a dependent task may start once this predecessor is in this status
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Successful)
    }

    /// Dispatched work the reconciler must not re-dispatch
    pub fn is_executing(&self) -> bool {
        matches!(
            self,
            Self::Initiated | Self::Running | Self::RunningWaitInitiated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Initiated => "INITIATED",
            Self::Running => "RUNNING",
            Self::RunningWait => "RUNNING_WAIT",
            Self::RunningWaitInitiated => "RUNNING_WAIT_INITIATED",
            Self::Successful => "SUCCESSFUL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "INITIATED" => Ok(Self::Initiated),
            "RUNNING" => Ok(Self::Running),
            "RUNNING_WAIT" => Ok(Self::RunningWait),
            "RUNNING_WAIT_INITIATED" => Ok(Self::RunningWaitInitiated),
            "SUCCESSFUL" => Ok(Self::Successful),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Workflow status definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Created, waiting for the scheduler
    #[default]
    Pending,
    /// Picked by the scheduler, first reconciler tick outstanding
    Initiated,
    /// Tasks are being driven
    Running,
    CompletedSuccessfully,
    CompletedSuccessfullyWithCallbacksPending,
    CompletedWithFailure,
    CompletedWithFailureWithCallbacksPending,
    /// Callback workflow waiting for its parent to finish
    OnHold,
}

impl WorkflowStatus {
    /// Any of the four completed statuses
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompletedSuccessfully
                | Self::CompletedSuccessfullyWithCallbacksPending
                | Self::CompletedWithFailure
                | Self::CompletedWithFailureWithCallbacksPending
        )
    }

    /// Completed with no callback workflows left to wait for
    pub fn is_final(&self) -> bool {
        matches!(self, Self::CompletedSuccessfully | Self::CompletedWithFailure)
    }

    pub fn has_callbacks_pending(&self) -> bool {
        matches!(
            self,
            Self::CompletedSuccessfullyWithCallbacksPending
                | Self::CompletedWithFailureWithCallbacksPending
        )
    }

    /// Whether the terminal outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CompletedWithFailure | Self::CompletedWithFailureWithCallbacksPending
        )
    }

    /// Statuses the scheduler re-dispatches on every sweep
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Pending | Self::Initiated | Self::Running) || self.has_callbacks_pending()
    }

    /// Plain terminal status for a completion outcome
    pub fn completed(failed: bool, callbacks_pending: bool) -> Self {
        match (failed, callbacks_pending) {
            (false, false) => Self::CompletedSuccessfully,
            (false, true) => Self::CompletedSuccessfullyWithCallbacksPending,
            (true, false) => Self::CompletedWithFailure,
            (true, true) => Self::CompletedWithFailureWithCallbacksPending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Initiated => "INITIATED",
            Self::Running => "RUNNING",
            Self::CompletedSuccessfully => "COMPLETED_SUCCESSFULLY",
            Self::CompletedSuccessfullyWithCallbacksPending => {
                "COMPLETED_SUCCESSFULLY_WITH_CALLBACKS_PENDING"
            }
            Self::CompletedWithFailure => "COMPLETED_WITH_FAILURE",
            Self::CompletedWithFailureWithCallbacksPending => {
                "COMPLETED_WITH_FAILURE_WITH_CALLBACKS_PENDING"
            }
            Self::OnHold => "ON_HOLD",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "INITIATED" => Ok(Self::Initiated),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED_SUCCESSFULLY" => Ok(Self::CompletedSuccessfully),
            "COMPLETED_SUCCESSFULLY_WITH_CALLBACKS_PENDING" => {
                Ok(Self::CompletedSuccessfullyWithCallbacksPending)
            }
            "COMPLETED_WITH_FAILURE" => Ok(Self::CompletedWithFailure),
            "COMPLETED_WITH_FAILURE_WITH_CALLBACKS_PENDING" => {
                Ok(Self::CompletedWithFailureWithCallbacksPending)
            }
            "ON_HOLD" => Ok(Self::OnHold),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}
