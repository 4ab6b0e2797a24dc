use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{RootType, WorkflowNature};
use crate::state_machine::WorkflowStatus;

/// Workflow record: a named DAG of tasks plus its scheduling state
///
/// Callback workflows carry `parent_workflow_id` and a non-normal `root_type`; they are
/// created ON_HOLD and only become visible to the scheduler once released by their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Uuid,
    pub name: String,
    pub nature: WorkflowNature,
    pub project_id: String,
    pub status: WorkflowStatus,
    /// Set while exactly one reconciler tick holds the workflow
    pub executor_running: bool,
    /// Released callback workflows not yet in a final status
    pub status_holding_callbacks_count: i32,
    pub root_type: RootType,
    pub parent_workflow_id: Option<Uuid>,
    pub request_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// New top-level workflow in PENDING
    pub fn new(name: impl Into<String>, nature: WorkflowNature, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: Uuid::now_v7(),
            name: name.into(),
            nature,
            project_id: project_id.into(),
            status: WorkflowStatus::Pending,
            executor_running: false,
            status_holding_callbacks_count: 0,
            root_type: RootType::Normal,
            parent_workflow_id: None,
            request_payload: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// New callback workflow held until `parent_workflow_id` finishes
    pub fn new_callback(
        name: impl Into<String>,
        nature: WorkflowNature,
        project_id: impl Into<String>,
        parent_workflow_id: Uuid,
        root_type: RootType,
    ) -> Self {
        Self {
            status: WorkflowStatus::OnHold,
            root_type,
            parent_workflow_id: Some(parent_workflow_id),
            ..Self::new(name, nature, project_id)
        }
    }

    pub fn is_callback(&self) -> bool {
        self.root_type.is_callback()
    }
}
