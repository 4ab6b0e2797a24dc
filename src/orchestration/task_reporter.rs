//! # Task Reporter
//!
//! The path by which handlers move their own task: read the task, compute the target with the
//! task state machine, commit it with a compare-and-set on the status that was read. Only the
//! given task id is ever written.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::constants::system::TASK_REPORT_MAX_ATTEMPTS;
use crate::error::{EngineError, Result};
use crate::logging::log_task_operation;
use crate::state_machine::{TaskEvent, TaskStateMachine, TaskStatus};
use crate::store::{TaskUpdate, WorkflowStore};

#[derive(Clone)]
pub struct TaskReporter {
    store: Arc<dyn WorkflowStore>,
}

impl TaskReporter {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Apply `event` to the task's current status
    pub async fn report(&self, task_id: Uuid, event: TaskEvent) -> Result<TaskStatus> {
        for attempt in 1..=TASK_REPORT_MAX_ATTEMPTS {
            let task = self
                .store
                .find_task(task_id)
                .await?
                .ok_or(EngineError::TaskNotFound(task_id))?;

            if let Some(status) = self.apply(task.workflow_id, task_id, task.status, &event).await? {
                return Ok(status);
            }
            debug!(
                task_id = %task_id,
                attempt,
                event = event.event_type(),
                "Task changed concurrently, retrying report"
            );
        }

        Err(EngineError::Internal(format!(
            "task {task_id} kept changing while applying '{}'",
            event.event_type()
        )))
    }

    /// Apply `event` only if the task is still in `expected`.
    ///
    /// `Ok(None)` means the task has moved on, e.g. a duplicate delivery of a handler job.
    pub async fn report_if_status(
        &self,
        task_id: Uuid,
        expected: TaskStatus,
        event: TaskEvent,
    ) -> Result<Option<TaskStatus>> {
        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;
        if task.status != expected {
            return Ok(None);
        }
        self.apply(task.workflow_id, task_id, expected, &event).await
    }

    async fn apply(
        &self,
        workflow_id: Uuid,
        task_id: Uuid,
        current: TaskStatus,
        event: &TaskEvent,
    ) -> Result<Option<TaskStatus>> {
        let target = TaskStateMachine::determine_target_state(current, event)?;
        let mut update =
            TaskUpdate::status(target).with_resource_id(event.resource_id().map(str::to_string));
        if let Some(message) = event.error_message() {
            update = update.with_message(message);
        }

        if !self
            .store
            .update_task_if_status(task_id, current, &update)
            .await?
        {
            return Ok(None);
        }

        log_task_operation(
            event.event_type(),
            workflow_id,
            task_id,
            target.as_str(),
            event.error_message(),
        );
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceType, Task, TaskType, Workflow, WorkflowNature};
    use crate::state_machine::StateMachineError;
    use crate::store::MemoryWorkflowStore;

    async fn store_with_task(status: TaskStatus) -> (Arc<MemoryWorkflowStore>, Uuid) {
        let store = Arc::new(MemoryWorkflowStore::new());
        let workflow = Workflow::new("wf", WorkflowNature::Create, "p1");
        let mut task = Task::new(workflow.workflow_id, ResourceType::new("VPC"), TaskType::Create);
        task.status = status;
        let task_id = task.task_id;
        store.create_workflow(&workflow, &[task]).await.unwrap();
        (store, task_id)
    }

    #[tokio::test]
    async fn test_report_applies_transition_and_details() {
        let (store, task_id) = store_with_task(TaskStatus::Running).await;
        let reporter = TaskReporter::new(store.clone());

        let status = reporter
            .report(
                task_id,
                TaskEvent::AwaitExternal {
                    resource_id: Some("vpc-123".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::RunningWait);

        let status = reporter
            .report(task_id, TaskEvent::fail_with_error("quota exceeded"))
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Failed);

        let task = store.find_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.resource_id.as_deref(), Some("vpc-123"));
        assert_eq!(task.message.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn test_report_rejects_illegal_transition() {
        let (store, task_id) = store_with_task(TaskStatus::Successful).await;
        let reporter = TaskReporter::new(store);

        let err = reporter
            .report(task_id, TaskEvent::fail_with_error("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::StateMachine(StateMachineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_report_if_status_skips_moved_tasks() {
        let (store, task_id) = store_with_task(TaskStatus::Running).await;
        let reporter = TaskReporter::new(store);

        assert_eq!(
            reporter
                .report_if_status(task_id, TaskStatus::Initiated, TaskEvent::Begin)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let reporter = TaskReporter::new(Arc::new(MemoryWorkflowStore::new()));
        let missing = Uuid::now_v7();
        assert!(matches!(
            reporter.report(missing, TaskEvent::Begin).await,
            Err(EngineError::TaskNotFound(id)) if id == missing
        ));
    }
}
