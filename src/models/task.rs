//! # Task Model
//!
//! One node of a workflow's DAG: a single provisioning or teardown step against one resource.
//!
//! Edges live on both ends: `previous_task_ids` are the predecessors that must be
//! SUCCESSFUL before the task may leave PENDING, `next_task_ids` the successors the
//! reconciler pulls into focus once the task succeeds. Both lists keep authored order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ResourceType, TaskType};
use crate::registry::HandlerKey;
use crate::state_machine::TaskStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub workflow_id: Uuid,
    pub resource_type: ResourceType,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Still tracked by the reconciler's frontier
    pub in_focus: bool,
    /// Provisioned entity, once the handler knows it
    pub resource_id: Option<String>,
    /// Failure detail
    pub message: Option<String>,
    /// Handler input
    pub task_metadata: Option<serde_json::Value>,
    pub previous_task_ids: Vec<Uuid>,
    pub next_task_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// New PENDING task with no edges
    pub fn new(workflow_id: Uuid, resource_type: ResourceType, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::now_v7(),
            workflow_id,
            resource_type,
            task_type,
            status: TaskStatus::Pending,
            in_focus: false,
            resource_id: None,
            message: None,
            task_metadata: None,
            previous_task_ids: Vec::new(),
            next_task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Registry key for this task's handlers
    pub fn handler_key(&self) -> HandlerKey {
        HandlerKey::new(self.resource_type.clone(), self.task_type)
    }

    /// Tasks without predecessors start on the first tick
    pub fn is_root(&self) -> bool {
        self.previous_task_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;

    #[test]
    fn test_new_task_defaults() {
        let workflow_id = Uuid::now_v7();
        let task = Task::new(workflow_id, ResourceType::new("VPC"), TaskType::Create);

        assert_eq!(task.workflow_id, workflow_id);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.in_focus);
        assert!(task.is_root());
        assert_eq!(task.handler_key().to_string(), "VPC/CREATE");
    }
}
