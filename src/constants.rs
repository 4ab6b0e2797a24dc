//! # System Constants
//!
//! Status groupings and lifecycle event names shared by the scheduler,
//! the reconciler and the store implementations.

pub use crate::state_machine::WorkflowStatus;

/// Lifecycle event names published through [`crate::events::EventPublisher`]
pub mod events {
    pub const WORKFLOW_INITIATED: &str = "workflow.initiated";
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_CALLBACKS_RESOLVED: &str = "workflow.callbacks_resolved";

    pub const TASK_DISPATCHED: &str = "task.dispatched";
    pub const TASK_WAIT_DISPATCHED: &str = "task.wait_dispatched";
    pub const TASK_FAILED: &str = "task.failed";

    pub const CALLBACK_RELEASED: &str = "callback.released";
    pub const CALLBACK_DISCARDED: &str = "callback.discarded";
}

/// Status groups used by store queries
pub mod status_groups {
    use super::WorkflowStatus;

    /// Workflow statuses the scheduler sweep re-dispatches
    pub const SCHEDULABLE_WORKFLOW_STATUSES: &[WorkflowStatus] = &[
        WorkflowStatus::Pending,
        WorkflowStatus::Initiated,
        WorkflowStatus::Running,
        WorkflowStatus::CompletedSuccessfullyWithCallbacksPending,
        WorkflowStatus::CompletedWithFailureWithCallbacksPending,
    ];
}

/// Engine-wide defaults
pub mod system {
    /// Attempts made to clear `executor_running` before giving up
    pub const DEFAULT_EXECUTOR_RELEASE_ATTEMPTS: u32 = 3;
    /// Delay between release attempts
    pub const EXECUTOR_RELEASE_BACKOFF_MS: u64 = 50;
    /// Compare-and-set retries when a handler reports a task transition
    pub const TASK_REPORT_MAX_ATTEMPTS: u32 = 3;
    /// Prefix for environment variable overrides (`PROVISIONER__WORKER__CONCURRENCY`)
    pub const ENV_PREFIX: &str = "PROVISIONER";
}
