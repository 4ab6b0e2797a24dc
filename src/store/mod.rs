//! # Durable Store
//!
//! The engine's only shared mutable resource. Every invariant reduces to "read the current
//! status, compute the next one, commit it with a compare-and-set", so the trait exposes
//! conditional writes rather than whole-record saves.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Task, Workflow};
use crate::state_machine::{TaskStatus, WorkflowStatus};

pub use memory::MemoryWorkflowStore;
#[cfg(feature = "postgres")]
pub use postgres::PgWorkflowStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of trying to take the per-workflow executor flag
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorClaim {
    /// Flag flipped false -> true; carries the workflow as read under the claim
    Acquired(Workflow),
    /// Another tick holds the flag
    AlreadyRunning,
    NotFound,
}

/// Partial task write applied by [`WorkflowStore::update_task_if_status`]
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub in_focus: Option<bool>,
    pub message: Option<String>,
    pub resource_id: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn focus(in_focus: bool) -> Self {
        Self {
            in_focus: Some(in_focus),
            ..Self::default()
        }
    }

    pub fn with_focus(mut self, in_focus: bool) -> Self {
        self.in_focus = Some(in_focus);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: Option<String>) -> Self {
        if resource_id.is_some() {
            self.resource_id = resource_id;
        }
        self
    }

    /// Apply to an in-memory record
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(in_focus) = self.in_focus {
            task.in_focus = in_focus;
        }
        if let Some(message) = &self.message {
            task.message = Some(message.clone());
        }
        if let Some(resource_id) = &self.resource_id {
            task.resource_id = Some(resource_id.clone());
        }
        task.updated_at = chrono::Utc::now();
    }
}

/// Durable store boundary for workflow and task records
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a workflow with its tasks and edges atomically
    async fn create_workflow(&self, workflow: &Workflow, tasks: &[Task]) -> StoreResult<()>;

    async fn find_workflow(&self, workflow_id: Uuid) -> StoreResult<Option<Workflow>>;

    /// Delete a workflow, its tasks, and any callback workflows below it.
    /// Returns false when nothing was deleted.
    async fn delete_workflow(&self, workflow_id: Uuid) -> StoreResult<bool>;

    /// Workflows the scheduler should fan out: not held by a tick and in a schedulable status
    async fn list_schedulable_workflows(&self) -> StoreResult<Vec<Workflow>>;

    async fn list_callback_workflows(&self, parent_workflow_id: Uuid) -> StoreResult<Vec<Workflow>>;

    /// Atomic false -> true on `executor_running`
    async fn try_claim_executor(&self, workflow_id: Uuid) -> StoreResult<ExecutorClaim>;

    async fn release_executor(&self, workflow_id: Uuid) -> StoreResult<()>;

    /// Compare-and-set on workflow status; stamps `completed_at` when `next` is terminal
    async fn transition_workflow_status(
        &self,
        workflow_id: Uuid,
        expected: WorkflowStatus,
        next: WorkflowStatus,
    ) -> StoreResult<bool>;

    /// RUNNING -> terminal, writing the holding-callbacks count in the same update
    async fn complete_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        holding_callbacks: i32,
    ) -> StoreResult<bool>;

    /// Decrement `status_holding_callbacks_count`, floored at zero. Returns the new count.
    async fn decrement_holding_callbacks(&self, workflow_id: Uuid) -> StoreResult<Option<i32>>;

    async fn find_task(&self, task_id: Uuid) -> StoreResult<Option<Task>>;

    /// Tasks of a workflow in creation order
    async fn list_tasks(&self, workflow_id: Uuid) -> StoreResult<Vec<Task>>;

    /// Compare-and-set on task status
    async fn update_task_if_status(
        &self,
        task_id: Uuid,
        expected: TaskStatus,
        update: &TaskUpdate,
    ) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceType, TaskType};

    #[test]
    fn test_task_update_applies_only_set_fields() {
        let mut task = Task::new(Uuid::now_v7(), ResourceType::new("VPC"), TaskType::Create);
        task.resource_id = Some("vpc-1".to_string());

        TaskUpdate::status(TaskStatus::Failed)
            .with_message("boom")
            .with_resource_id(None)
            .apply_to(&mut task);

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.message.as_deref(), Some("boom"));
        assert_eq!(task.resource_id.as_deref(), Some("vpc-1"));
        assert!(!task.in_focus);
    }
}
