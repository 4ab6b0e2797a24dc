//! # Orchestration Types
//!
//! Reports returned by the reconciler and scheduler entry points.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::WorkflowStatus;

/// Result of one reconciler invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TickOutcome {
    /// Workflow no longer exists; nothing to do
    NotFound,
    /// Another tick holds `executor_running`
    AlreadyRunning,
    /// Tick ran to completion
    Advanced(TickReport),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Advanced(report) => Some(report),
            _ => None,
        }
    }
}

/// What one tick did to a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub workflow_id: Uuid,
    /// Status read under the executor claim
    pub initial_status: WorkflowStatus,
    /// Status after the tick
    pub status: WorkflowStatus,
    /// Tasks whose run handler was enqueued
    pub dispatched_runs: Vec<Uuid>,
    /// Tasks whose wait handler was enqueued
    pub dispatched_waits: Vec<Uuid>,
    /// Tasks failed by the reconciler (missing handlers)
    pub failed_tasks: Vec<Uuid>,
    /// Tasks still in flight
    pub running: usize,
    /// Callback workflows moved ON_HOLD -> PENDING
    pub released_callbacks: Vec<Uuid>,
    /// Callback workflows deleted because their trigger did not match
    pub discarded_callbacks: Vec<Uuid>,
}

impl TickReport {
    pub fn new(workflow_id: Uuid, initial_status: WorkflowStatus) -> Self {
        Self {
            workflow_id,
            initial_status,
            status: initial_status,
            dispatched_runs: Vec::new(),
            dispatched_waits: Vec::new(),
            failed_tasks: Vec::new(),
            running: 0,
            released_callbacks: Vec::new(),
            discarded_callbacks: Vec::new(),
        }
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatched_runs.len() + self.dispatched_waits.len()
    }

    pub fn status_changed(&self) -> bool {
        self.initial_status != self.status
    }
}

/// What one scheduler sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Workflows returned by the schedulable query
    pub candidates: usize,
    /// PENDING -> INITIATED transitions committed by this sweep
    pub initiated: usize,
    /// Reconciler jobs enqueued
    pub dispatched: usize,
    pub dispatch_failures: usize,
}
