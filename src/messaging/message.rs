//! # Job Messages
//!
//! Units of work carried by the queue. The engine both produces these (reconciler and handler
//! jobs) and consumes them (scheduler sweep and reconciler ticks).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::HandlerKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    /// Scheduler sweep over all schedulable workflows
    ManageWorkflows,
    /// One reconciler tick for a workflow
    ExecuteWorkflow { workflow_id: Uuid },
    /// Invoke the run handler of a task
    RunTask { task_id: Uuid, key: HandlerKey },
    /// Invoke the wait handler of a task parked in RUNNING_WAIT
    WaitTask { task_id: Uuid, key: HandlerKey },
}

impl Job {
    /// Queue job name
    pub fn name(&self) -> &'static str {
        match self {
            Self::ManageWorkflows => "workflow_manager",
            Self::ExecuteWorkflow { .. } => "workflow_executor",
            Self::RunTask { .. } => "task_run",
            Self::WaitTask { .. } => "task_wait",
        }
    }

    pub fn workflow_id(&self) -> Option<Uuid> {
        match self {
            Self::ExecuteWorkflow { workflow_id } => Some(*workflow_id),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::RunTask { task_id, .. } | Self::WaitTask { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceType, TaskType};

    #[test]
    fn test_job_names() {
        assert_eq!(Job::ManageWorkflows.name(), "workflow_manager");
        assert_eq!(
            Job::ExecuteWorkflow {
                workflow_id: Uuid::nil()
            }
            .name(),
            "workflow_executor"
        );
    }

    #[test]
    fn test_job_wire_shape() {
        let task_id = Uuid::now_v7();
        let job = Job::WaitTask {
            task_id,
            key: HandlerKey::new(ResourceType::new("VPC"), TaskType::Create),
        };
        let json = job.to_json().unwrap();

        assert_eq!(json["job"], "wait_task");
        assert_eq!(json["key"]["resource_type"], "VPC");
        assert_eq!(json["key"]["task_type"], "CREATE");
        assert_eq!(job.task_id(), Some(task_id));
        assert_eq!(job.workflow_id(), None);
    }
}
