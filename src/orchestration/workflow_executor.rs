//! # Workflow Executor
//!
//! The reconciler: one stateless tick that advances a single workflow from its persisted state.
//!
//! ## Tick
//!
//! 1. Claim `executor_running` with a compare-and-set; a lost claim is a no-op.
//! 2. INITIATED: initiate every root task, then move the workflow to RUNNING.
//! 3. RUNNING: walk the in-focus frontier. PENDING tasks start once every predecessor is
//!    SUCCESSFUL, RUNNING_WAIT tasks get their wait handler, SUCCESSFUL tasks pull their
//!    successors into focus, terminal tasks leave focus.
//! 4. RUNNING with nothing in flight: resolve to a terminal status and chain callbacks.
//! 5. CALLBACKS_PENDING: collapse to the plain terminal status once no callback is holding.
//! 6. Release `executor_running`, whatever happened above (errors and panics included).
//!
//! Handler lookup misses fail the task, never the tick.

use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::callback_coordinator::CallbackCoordinator;
use super::dependency_graph::DependencyGraph;
use super::types::{TickOutcome, TickReport};
use crate::constants::{events, system};
use crate::error::{EngineError, Result};
use crate::events::{EventPublisher, LifecycleEvent};
use crate::logging::{log_error, log_task_operation, log_workflow_operation};
use crate::messaging::{Dispatcher, Job};
use crate::models::{Task, Workflow};
use crate::registry::TaskRegistry;
use crate::state_machine::{
    TaskEvent, TaskStateMachine, TaskStatus, WorkflowEvent, WorkflowStateMachine, WorkflowStatus,
};
use crate::store::{ExecutorClaim, TaskUpdate, WorkflowStore};

/// Whether a task counts toward the in-flight total after it was evaluated
enum Disposition {
    InFlight,
    Idle,
}

pub struct WorkflowExecutor {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<TaskRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    events: EventPublisher,
    callbacks: CallbackCoordinator,
    release_attempts: u32,
}

impl WorkflowExecutor {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<TaskRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        events: EventPublisher,
    ) -> Self {
        Self {
            callbacks: CallbackCoordinator::new(Arc::clone(&store), events.clone()),
            store,
            registry,
            dispatcher,
            events,
            release_attempts: system::DEFAULT_EXECUTOR_RELEASE_ATTEMPTS,
        }
    }

    pub fn with_release_attempts(mut self, attempts: u32) -> Self {
        self.release_attempts = attempts.max(1);
        self
    }

    /// Run one tick for `workflow_id`
    #[instrument(skip(self), fields(workflow_id = %workflow_id))]
    pub async fn execute(&self, workflow_id: Uuid) -> Result<TickOutcome> {
        let workflow = match self.store.try_claim_executor(workflow_id).await? {
            ExecutorClaim::Acquired(workflow) => workflow,
            ExecutorClaim::AlreadyRunning => {
                debug!("Executor already running for workflow, skipping tick");
                return Ok(TickOutcome::AlreadyRunning);
            }
            ExecutorClaim::NotFound => {
                info!("Workflow no longer exists, nothing to execute");
                return Ok(TickOutcome::NotFound);
            }
        };

        let outcome = AssertUnwindSafe(self.tick(workflow))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(EngineError::Internal(format!(
                    "reconciler tick panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let released = self.release(workflow_id).await;

        match (outcome, released) {
            (Ok(report), Ok(())) => {
                debug!(
                    status = %report.status,
                    running = report.running,
                    dispatched = report.dispatch_count(),
                    "Tick complete"
                );
                Ok(TickOutcome::Advanced(report))
            }
            (Err(err), _) => {
                log_error(
                    "workflow_executor",
                    "tick",
                    &err.to_string(),
                    Some(workflow_id.to_string().as_str()),
                );
                Err(err)
            }
            (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Clear `executor_running`, retrying with a short backoff
    async fn release(&self, workflow_id: Uuid) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.release_executor(workflow_id).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.release_attempts => {
                    warn!(attempt, error = %err, "Failed to release executor flag, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        system::EXECUTOR_RELEASE_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts = attempt, error = %err, "Executor flag left set");
                    return Err(err.into());
                }
            }
        }
    }

    async fn tick(&self, workflow: Workflow) -> Result<TickReport> {
        let workflow_id = workflow.workflow_id;
        let mut report = TickReport::new(workflow_id, workflow.status);

        match workflow.status {
            WorkflowStatus::Initiated => {
                self.start(&workflow, &mut report).await?;
            }
            WorkflowStatus::Running => {
                self.advance(&workflow, &mut report).await?;
            }
            status if status.has_callbacks_pending() => {
                let status = self.callbacks.settle_parent(&workflow, &mut report).await?;
                report.status = status;
                if report.status.is_final() && workflow.is_callback() {
                    self.callbacks.notify_parent(&workflow).await?;
                }
                return Ok(report);
            }
            status => {
                debug!(status = %status, "Workflow not in an executable status");
                return Ok(report);
            }
        }

        if report.status == WorkflowStatus::Running && report.running == 0 {
            self.finalize(&workflow, &mut report).await?;
        }
        Ok(report)
    }

    /// First tick: initiate the DAG roots, then INITIATED -> RUNNING
    async fn start(&self, workflow: &Workflow, report: &mut TickReport) -> Result<()> {
        let workflow_id = workflow.workflow_id;
        let tasks = self.store.list_tasks(workflow_id).await?;
        let graph = DependencyGraph::from_tasks(&tasks);
        let by_id: HashMap<Uuid, &Task> = tasks.iter().map(|t| (t.task_id, t)).collect();

        for root_id in graph.roots() {
            let Some(task) = by_id.get(&root_id) else {
                continue;
            };
            let disposition = match task.status {
                TaskStatus::Pending => self.initiate(workflow, task, report).await?,
                // Re-run after a crash between root initiation and the status commit
                status if status.is_terminal() => Disposition::Idle,
                _ => Disposition::InFlight,
            };
            if matches!(disposition, Disposition::InFlight) {
                report.running += 1;
            }
        }

        let target = WorkflowStateMachine::determine_target_state(workflow.status, WorkflowEvent::Start)?;
        if !self
            .store
            .transition_workflow_status(workflow_id, workflow.status, target)
            .await?
        {
            return Err(EngineError::Internal(format!(
                "workflow {workflow_id} changed status while held by the executor"
            )));
        }
        report.status = target;

        log_workflow_operation("start", workflow_id, target.as_str(), None);
        info!(
            workflow_id = %workflow_id,
            roots = graph.roots().len(),
            running = report.running,
            "Workflow started"
        );
        self.events.publish(LifecycleEvent::workflow(
            events::WORKFLOW_STARTED,
            workflow_id,
            json!({ "roots": report.dispatched_runs, "failed": report.failed_tasks }),
        ));
        Ok(())
    }

    /// Subsequent ticks: walk the in-focus frontier
    async fn advance(&self, workflow: &Workflow, report: &mut TickReport) -> Result<()> {
        let tasks = self.store.list_tasks(workflow.workflow_id).await?;
        let graph = DependencyGraph::from_tasks(&tasks);

        // Readiness reads this snapshot only; a tick never makes a task SUCCESSFUL
        let statuses: HashMap<Uuid, TaskStatus> =
            tasks.iter().map(|t| (t.task_id, t.status)).collect();
        let mut snapshot: HashMap<Uuid, Task> =
            tasks.iter().map(|t| (t.task_id, t.clone())).collect();

        let mut frontier: VecDeque<Uuid> = tasks
            .iter()
            .filter(|t| t.in_focus)
            .map(|t| t.task_id)
            .collect();
        let mut tracked: HashSet<Uuid> = frontier.iter().copied().collect();

        while let Some(task_id) = frontier.pop_front() {
            let Some(task) = snapshot.get(&task_id).cloned() else {
                warn!(task_id = %task_id, "Task referenced by the frontier is missing");
                continue;
            };

            let disposition = match task.status {
                TaskStatus::Pending => {
                    if graph.is_ready(task_id, &statuses) {
                        self.initiate(workflow, &task, report).await?
                    } else {
                        debug!(
                            task_id = %task_id,
                            blocked_by = ?graph.blocked_by(task_id, &statuses),
                            "Task not ready"
                        );
                        Disposition::Idle
                    }
                }
                TaskStatus::Initiated | TaskStatus::Running | TaskStatus::RunningWaitInitiated => {
                    Disposition::InFlight
                }
                TaskStatus::RunningWait => self.dispatch_wait(workflow, &task, report).await?,
                TaskStatus::Successful => {
                    for successor_id in graph.successors(task_id) {
                        if !tracked.insert(*successor_id) {
                            continue;
                        }
                        self.focus(*successor_id, &mut snapshot).await?;
                        frontier.push_back(*successor_id);
                    }
                    self.unfocus(&task).await?;
                    Disposition::Idle
                }
                TaskStatus::Failed => {
                    self.unfocus(&task).await?;
                    Disposition::Idle
                }
            };

            if matches!(disposition, Disposition::InFlight) {
                report.running += 1;
            }
        }
        Ok(())
    }

    /// Quiescent RUNNING workflow: resolve to a terminal status
    async fn finalize(&self, workflow: &Workflow, report: &mut TickReport) -> Result<()> {
        let tasks = self.store.list_tasks(workflow.workflow_id).await?;
        let failed = tasks.iter().any(|t| t.status == TaskStatus::Failed);

        let stranded = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        if stranded > 0 && !failed {
            warn!(
                workflow_id = %workflow.workflow_id,
                stranded,
                "Pending tasks left behind at quiescence"
            );
        }

        let status = self
            .callbacks
            .complete_parent(workflow, failed, report)
            .await?;
        report.status = status;
        log_workflow_operation(
            "finalize",
            workflow.workflow_id,
            status.as_str(),
            failed.then_some("task failures"),
        );
        if report.status.is_final() && workflow.is_callback() {
            self.callbacks.notify_parent(workflow).await?;
        }
        Ok(())
    }

    /// PENDING -> INITIATED and enqueue the run handler, or fail the task if none is registered
    async fn initiate(
        &self,
        workflow: &Workflow,
        task: &Task,
        report: &mut TickReport,
    ) -> Result<Disposition> {
        let key = task.handler_key();
        if self.registry.run_handler(&key).is_none() {
            let message = format!("Internal error: no run handler registered for {key}");
            return self.fail(workflow, task, message, report).await;
        }

        let target = TaskStateMachine::determine_target_state(task.status, &TaskEvent::Initiate)?;
        let update = TaskUpdate::status(target).with_focus(true);
        if !self
            .store
            .update_task_if_status(task.task_id, task.status, &update)
            .await?
        {
            // Changed underneath us; assume it is moving and look again next tick
            return Ok(Disposition::InFlight);
        }

        let job = Job::RunTask {
            task_id: task.task_id,
            key: key.clone(),
        };
        if let Err(err) = self.dispatcher.dispatch(job).await {
            self.revert_dispatch(task.task_id, target).await?;
            return Err(err.into());
        }

        log_task_operation(
            "dispatch_run",
            workflow.workflow_id,
            task.task_id,
            target.as_str(),
            Some(key.to_string().as_str()),
        );
        report.dispatched_runs.push(task.task_id);
        self.events.publish(LifecycleEvent::task(
            events::TASK_DISPATCHED,
            workflow.workflow_id,
            task.task_id,
            json!({ "handler": key.to_string() }),
        ));
        Ok(Disposition::InFlight)
    }

    /// RUNNING_WAIT -> RUNNING_WAIT_INITIATED and enqueue the wait handler
    async fn dispatch_wait(
        &self,
        workflow: &Workflow,
        task: &Task,
        report: &mut TickReport,
    ) -> Result<Disposition> {
        let key = task.handler_key();
        if self.registry.wait_handler(&key).is_none() {
            let message = format!("Internal error: no wait handler registered for {key}");
            return self.fail(workflow, task, message, report).await;
        }

        let target = TaskStateMachine::determine_target_state(task.status, &TaskEvent::InitiateWait)?;
        if !self
            .store
            .update_task_if_status(task.task_id, task.status, &TaskUpdate::status(target))
            .await?
        {
            return Ok(Disposition::InFlight);
        }

        let job = Job::WaitTask {
            task_id: task.task_id,
            key: key.clone(),
        };
        if let Err(err) = self.dispatcher.dispatch(job).await {
            self.revert_dispatch(task.task_id, target).await?;
            return Err(err.into());
        }

        log_task_operation(
            "dispatch_wait",
            workflow.workflow_id,
            task.task_id,
            target.as_str(),
            Some(key.to_string().as_str()),
        );
        report.dispatched_waits.push(task.task_id);
        self.events.publish(LifecycleEvent::task(
            events::TASK_WAIT_DISPATCHED,
            workflow.workflow_id,
            task.task_id,
            json!({ "handler": key.to_string() }),
        ));
        Ok(Disposition::InFlight)
    }

    /// Local task failure; the tick carries on with the other tasks
    async fn fail(
        &self,
        workflow: &Workflow,
        task: &Task,
        message: String,
        report: &mut TickReport,
    ) -> Result<Disposition> {
        let target =
            TaskStateMachine::determine_target_state(task.status, &TaskEvent::Fail(message.clone()))?;
        let update = TaskUpdate::status(target)
            .with_focus(false)
            .with_message(message.clone());
        if !self
            .store
            .update_task_if_status(task.task_id, task.status, &update)
            .await?
        {
            return Ok(Disposition::InFlight);
        }

        warn!(
            workflow_id = %workflow.workflow_id,
            task_id = %task.task_id,
            error = %message,
            "Task failed by reconciler"
        );
        report.failed_tasks.push(task.task_id);
        self.events.publish(LifecycleEvent::task(
            events::TASK_FAILED,
            workflow.workflow_id,
            task.task_id,
            json!({ "message": message }),
        ));
        Ok(Disposition::Idle)
    }

    /// Undo the dispatch marker after a failed enqueue
    async fn revert_dispatch(&self, task_id: Uuid, dispatched: TaskStatus) -> Result<()> {
        let target = TaskStateMachine::determine_target_state(dispatched, &TaskEvent::RevertDispatch)?;
        if !self
            .store
            .update_task_if_status(task_id, dispatched, &TaskUpdate::status(target))
            .await?
        {
            warn!(task_id = %task_id, "Task moved on before its dispatch could be reverted");
        }
        Ok(())
    }

    /// Persist `in_focus` on a PENDING successor before it is evaluated
    async fn focus(&self, task_id: Uuid, snapshot: &mut HashMap<Uuid, Task>) -> Result<()> {
        let Some(task) = snapshot.get_mut(&task_id) else {
            return Ok(());
        };
        if task.in_focus || task.status != TaskStatus::Pending {
            return Ok(());
        }
        if self
            .store
            .update_task_if_status(task_id, TaskStatus::Pending, &TaskUpdate::focus(true))
            .await?
        {
            task.in_focus = true;
        }
        Ok(())
    }

    async fn unfocus(&self, task: &Task) -> Result<()> {
        if task.in_focus {
            self.store
                .update_task_if_status(task.task_id, task.status, &TaskUpdate::focus(false))
                .await?;
        }
        Ok(())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
