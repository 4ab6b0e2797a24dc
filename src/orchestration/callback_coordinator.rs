//! # Callback Coordinator
//!
//! Chains callback workflows to their parent's outcome. At terminal resolution the callbacks
//! of the non-matching kind are deleted, the parent status and holding count are written, and
//! only then are the matching callbacks released ON_HOLD -> PENDING. A callback that reaches a
//! final status decrements its parent's count; the parent collapses to its plain terminal status
//! once the count is zero.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::TickReport;
use crate::constants::events;
use crate::error::{EngineError, Result};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::models::{RootType, Workflow};
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine, WorkflowStatus};
use crate::store::WorkflowStore;

#[derive(Clone)]
pub struct CallbackCoordinator {
    store: Arc<dyn WorkflowStore>,
    events: EventPublisher,
}

impl CallbackCoordinator {
    pub fn new(store: Arc<dyn WorkflowStore>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Move a quiescent RUNNING workflow to its terminal status
    pub async fn complete_parent(
        &self,
        workflow: &Workflow,
        failed: bool,
        report: &mut TickReport,
    ) -> Result<WorkflowStatus> {
        let workflow_id = workflow.workflow_id;
        let wanted = RootType::callback_for(failed);
        let callbacks = self.store.list_callback_workflows(workflow_id).await?;

        let mut matching = Vec::new();
        for callback in callbacks {
            if callback.root_type == wanted {
                matching.push(callback);
            } else if callback.status == WorkflowStatus::OnHold {
                self.discard(workflow_id, &callback, report).await?;
            } else {
                warn!(
                    workflow_id = %workflow_id,
                    callback_id = %callback.workflow_id,
                    status = %callback.status,
                    "Non-matching callback already left ON_HOLD; leaving it in place"
                );
            }
        }

        let holding = matching.iter().filter(|cb| !cb.status.is_final()).count();
        let holding = i32::try_from(holding)
            .map_err(|_| EngineError::Internal(format!("too many callbacks on {workflow_id}")))?;

        let target = WorkflowStateMachine::determine_target_state(
            WorkflowStatus::Running,
            WorkflowEvent::Finish {
                failed,
                callbacks_pending: holding > 0,
            },
        )?;
        if !self
            .store
            .complete_workflow(workflow_id, target, holding)
            .await?
        {
            return Err(EngineError::Internal(format!(
                "workflow {workflow_id} left RUNNING while held by the executor"
            )));
        }

        info!(
            workflow_id = %workflow_id,
            status = %target,
            holding_callbacks = holding,
            "Workflow completed"
        );
        self.events.publish(LifecycleEvent::workflow(
            events::WORKFLOW_COMPLETED,
            workflow_id,
            json!({ "status": target, "holding_callbacks": holding }),
        ));

        self.release_matching(workflow_id, &matching, report).await?;
        Ok(target)
    }

    /// CALLBACKS_PENDING tick: re-release stragglers, collapse once nothing is holding
    pub async fn settle_parent(
        &self,
        workflow: &Workflow,
        report: &mut TickReport,
    ) -> Result<WorkflowStatus> {
        let workflow_id = workflow.workflow_id;
        let wanted = RootType::callback_for(workflow.status.is_failure());
        let matching: Vec<Workflow> = self
            .store
            .list_callback_workflows(workflow_id)
            .await?
            .into_iter()
            .filter(|cb| cb.root_type == wanted)
            .collect();
        self.release_matching(workflow_id, &matching, report).await?;

        if workflow.status_holding_callbacks_count > 0 {
            debug!(
                workflow_id = %workflow_id,
                holding_callbacks = workflow.status_holding_callbacks_count,
                "Callbacks still pending"
            );
            return Ok(workflow.status);
        }

        let target =
            WorkflowStateMachine::determine_target_state(workflow.status, WorkflowEvent::CallbacksResolved)?;
        if !self
            .store
            .transition_workflow_status(workflow_id, workflow.status, target)
            .await?
        {
            return Err(EngineError::Internal(format!(
                "workflow {workflow_id} changed status while held by the executor"
            )));
        }

        info!(workflow_id = %workflow_id, status = %target, "Callbacks resolved");
        self.events.publish(LifecycleEvent::workflow(
            events::WORKFLOW_CALLBACKS_RESOLVED,
            workflow_id,
            json!({ "status": target }),
        ));
        Ok(target)
    }

    /// A callback workflow reached a final status; decrement its parent's holding count
    pub async fn notify_parent(&self, workflow: &Workflow) -> Result<Option<i32>> {
        let Some(parent_id) = workflow.parent_workflow_id else {
            return Ok(None);
        };

        let remaining = self.store.decrement_holding_callbacks(parent_id).await?;
        match remaining {
            Some(remaining) => debug!(
                parent_workflow_id = %parent_id,
                callback_id = %workflow.workflow_id,
                remaining,
                "Parent holding count decremented"
            ),
            None => warn!(
                parent_workflow_id = %parent_id,
                callback_id = %workflow.workflow_id,
                "Parent workflow of finished callback no longer exists"
            ),
        }
        Ok(remaining)
    }

    async fn release_matching(
        &self,
        parent_id: Uuid,
        callbacks: &[Workflow],
        report: &mut TickReport,
    ) -> Result<()> {
        for callback in callbacks.iter().filter(|cb| cb.status == WorkflowStatus::OnHold) {
            let target =
                WorkflowStateMachine::determine_target_state(callback.status, WorkflowEvent::Release)?;
            if self
                .store
                .transition_workflow_status(callback.workflow_id, callback.status, target)
                .await?
            {
                info!(
                    workflow_id = %parent_id,
                    callback_id = %callback.workflow_id,
                    root_type = %callback.root_type,
                    "Callback workflow released"
                );
                report.released_callbacks.push(callback.workflow_id);
                self.events.publish(LifecycleEvent::workflow(
                    events::CALLBACK_RELEASED,
                    callback.workflow_id,
                    json!({ "parent_workflow_id": parent_id }),
                ));
            }
        }
        Ok(())
    }

    async fn discard(
        &self,
        parent_id: Uuid,
        callback: &Workflow,
        report: &mut TickReport,
    ) -> Result<()> {
        if self.store.delete_workflow(callback.workflow_id).await? {
            info!(
                workflow_id = %parent_id,
                callback_id = %callback.workflow_id,
                root_type = %callback.root_type,
                "Callback workflow discarded"
            );
            report.discarded_callbacks.push(callback.workflow_id);
            self.events.publish(LifecycleEvent::workflow(
                events::CALLBACK_DISCARDED,
                callback.workflow_id,
                json!({ "parent_workflow_id": parent_id }),
            ));
        }
        Ok(())
    }
}
