use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ExecutorClaim, StoreError, StoreResult, TaskUpdate, WorkflowStore};
use crate::models::{Task, Workflow};
use crate::state_machine::{TaskStatus, WorkflowStatus};

/// In-process store backed by `DashMap`
///
/// Conditional writes run under the entry's shard lock, which gives the same single-writer
/// guarantee the SQL store gets from `UPDATE ... WHERE`.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: DashMap<Uuid, Workflow>,
    tasks: DashMap<Uuid, Task>,
    /// Task ids per workflow in creation order
    workflow_tasks: DashMap<Uuid, Vec<Uuid>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    fn descendants_of(&self, workflow_id: Uuid) -> Vec<Uuid> {
        let mut found = vec![workflow_id];
        let mut cursor = 0;
        while cursor < found.len() {
            let parent = found[cursor];
            let children: Vec<Uuid> = self
                .workflows
                .iter()
                .filter(|entry| entry.parent_workflow_id == Some(parent))
                .map(|entry| entry.workflow_id)
                .collect();
            found.extend(children);
            cursor += 1;
        }
        found
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create_workflow(&self, workflow: &Workflow, tasks: &[Task]) -> StoreResult<()> {
        if self.workflows.contains_key(&workflow.workflow_id) {
            return Err(StoreError::Conflict(format!(
                "workflow {} already exists",
                workflow.workflow_id
            )));
        }
        if let Some(task) = tasks.iter().find(|t| t.workflow_id != workflow.workflow_id) {
            return Err(StoreError::Conflict(format!(
                "task {} belongs to workflow {}",
                task.task_id, task.workflow_id
            )));
        }

        for task in tasks {
            self.tasks.insert(task.task_id, task.clone());
        }
        self.workflow_tasks.insert(
            workflow.workflow_id,
            tasks.iter().map(|t| t.task_id).collect(),
        );
        self.workflows.insert(workflow.workflow_id, workflow.clone());
        Ok(())
    }

    async fn find_workflow(&self, workflow_id: Uuid) -> StoreResult<Option<Workflow>> {
        Ok(self.workflows.get(&workflow_id).map(|w| w.clone()))
    }

    async fn delete_workflow(&self, workflow_id: Uuid) -> StoreResult<bool> {
        if !self.workflows.contains_key(&workflow_id) {
            return Ok(false);
        }

        for id in self.descendants_of(workflow_id) {
            if let Some((_, task_ids)) = self.workflow_tasks.remove(&id) {
                for task_id in task_ids {
                    self.tasks.remove(&task_id);
                }
            }
            self.workflows.remove(&id);
        }
        Ok(true)
    }

    async fn list_schedulable_workflows(&self) -> StoreResult<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|w| !w.executor_running && w.status.is_schedulable())
            .map(|w| w.clone())
            .collect();
        workflows.sort_by_key(|w| w.workflow_id);
        Ok(workflows)
    }

    async fn list_callback_workflows(&self, parent_workflow_id: Uuid) -> StoreResult<Vec<Workflow>> {
        let mut callbacks: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|w| w.parent_workflow_id == Some(parent_workflow_id))
            .map(|w| w.clone())
            .collect();
        callbacks.sort_by_key(|w| w.workflow_id);
        Ok(callbacks)
    }

    async fn try_claim_executor(&self, workflow_id: Uuid) -> StoreResult<ExecutorClaim> {
        let Some(mut workflow) = self.workflows.get_mut(&workflow_id) else {
            return Ok(ExecutorClaim::NotFound);
        };
        if workflow.executor_running {
            return Ok(ExecutorClaim::AlreadyRunning);
        }
        workflow.executor_running = true;
        workflow.updated_at = Utc::now();
        Ok(ExecutorClaim::Acquired(workflow.clone()))
    }

    async fn release_executor(&self, workflow_id: Uuid) -> StoreResult<()> {
        if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
            workflow.executor_running = false;
            workflow.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn transition_workflow_status(
        &self,
        workflow_id: Uuid,
        expected: WorkflowStatus,
        next: WorkflowStatus,
    ) -> StoreResult<bool> {
        let Some(mut workflow) = self.workflows.get_mut(&workflow_id) else {
            return Ok(false);
        };
        if workflow.status != expected {
            return Ok(false);
        }
        let now = Utc::now();
        workflow.status = next;
        workflow.updated_at = now;
        if next.is_terminal() && workflow.completed_at.is_none() {
            workflow.completed_at = Some(now);
        }
        Ok(true)
    }

    async fn complete_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        holding_callbacks: i32,
    ) -> StoreResult<bool> {
        let Some(mut workflow) = self.workflows.get_mut(&workflow_id) else {
            return Ok(false);
        };
        if workflow.status != WorkflowStatus::Running {
            return Ok(false);
        }
        let now = Utc::now();
        workflow.status = status;
        workflow.status_holding_callbacks_count = holding_callbacks;
        workflow.updated_at = now;
        workflow.completed_at = Some(now);
        Ok(true)
    }

    async fn decrement_holding_callbacks(&self, workflow_id: Uuid) -> StoreResult<Option<i32>> {
        let Some(mut workflow) = self.workflows.get_mut(&workflow_id) else {
            return Ok(None);
        };
        workflow.status_holding_callbacks_count =
            (workflow.status_holding_callbacks_count - 1).max(0);
        workflow.updated_at = Utc::now();
        Ok(Some(workflow.status_holding_callbacks_count))
    }

    async fn find_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.tasks.get(&task_id).map(|t| t.clone()))
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> StoreResult<Vec<Task>> {
        let Some(task_ids) = self.workflow_tasks.get(&workflow_id).map(|ids| ids.clone()) else {
            return Ok(Vec::new());
        };
        task_ids
            .into_iter()
            .map(|task_id| {
                self.tasks
                    .get(&task_id)
                    .map(|t| t.clone())
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "workflow {workflow_id} references missing task {task_id}"
                        ))
                    })
            })
            .collect()
    }

    async fn update_task_if_status(
        &self,
        task_id: Uuid,
        expected: TaskStatus,
        update: &TaskUpdate,
    ) -> StoreResult<bool> {
        let Some(mut task) = self.tasks.get_mut(&task_id) else {
            return Err(StoreError::NotFound {
                entity: "task",
                id: task_id,
            });
        };
        if task.status != expected {
            return Ok(false);
        }
        update.apply_to(&mut task);
        Ok(true)
    }
}
