//! # Workflow Manager
//!
//! The scheduler sweep: list every workflow that is not held by a tick and still has work,
//! commit PENDING -> INITIATED, and enqueue one reconciler job per workflow. The sweep holds no
//! state between runs, so it can be re-run on any schedule; `executor_running` keeps ticks of
//! the same workflow from overlapping.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::types::SweepReport;
use crate::constants::events;
use crate::error::Result;
use crate::events::{EventPublisher, LifecycleEvent};
use crate::messaging::{Dispatcher, Job};
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine, WorkflowStatus};
use crate::store::WorkflowStore;

pub struct WorkflowManager {
    store: Arc<dyn WorkflowStore>,
    dispatcher: Arc<dyn Dispatcher>,
    events: EventPublisher,
}

impl WorkflowManager {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        dispatcher: Arc<dyn Dispatcher>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            dispatcher,
            events,
        }
    }

    /// One sweep over all schedulable workflows
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let candidates = self.store.list_schedulable_workflows().await?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for workflow in candidates {
            let workflow_id = workflow.workflow_id;

            if workflow.status == WorkflowStatus::Pending {
                let target = WorkflowStateMachine::determine_target_state(
                    workflow.status,
                    WorkflowEvent::Initiate,
                )?;
                // Committed before the enqueue so a crash in between leaves it re-pickable
                if !self
                    .store
                    .transition_workflow_status(workflow_id, workflow.status, target)
                    .await?
                {
                    debug!(workflow_id = %workflow_id, "Workflow initiated by a concurrent sweep");
                    continue;
                }
                report.initiated += 1;
                self.events.publish(LifecycleEvent::workflow(
                    events::WORKFLOW_INITIATED,
                    workflow_id,
                    json!({ "name": workflow.name }),
                ));
            }

            match self
                .dispatcher
                .dispatch(Job::ExecuteWorkflow { workflow_id })
                .await
            {
                Ok(()) => report.dispatched += 1,
                Err(err) => {
                    warn!(
                        workflow_id = %workflow_id,
                        error = %err,
                        "Failed to enqueue reconciler job; next sweep retries"
                    );
                    report.dispatch_failures += 1;
                }
            }
        }

        if report.candidates > 0 {
            info!(
                candidates = report.candidates,
                initiated = report.initiated,
                dispatched = report.dispatched,
                dispatch_failures = report.dispatch_failures,
                "Workflow sweep complete"
            );
        }
        Ok(report)
    }
}
