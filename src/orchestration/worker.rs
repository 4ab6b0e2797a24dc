//! # Worker
//!
//! Stateless job consumers. [`JobRunner`] executes any [`Job`]: a scheduler sweep, a reconciler
//! tick, or a task's run/wait handler. [`Worker`] drains a [`JobReceiver`] with bounded
//! concurrency until shutdown, and [`spawn_manager_loop`] enqueues the periodic sweep.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::task_reporter::TaskReporter;
use super::workflow_executor::{panic_message, WorkflowExecutor};
use super::workflow_manager::WorkflowManager;
use crate::error::{EngineError, Result};
use crate::messaging::{Dispatcher, Job, JobReceiver};
use crate::registry::{HandlerKey, TaskRegistry};
use crate::state_machine::{TaskEvent, TaskStatus};
use crate::store::WorkflowStore;

/// Which handler a task job invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerKind {
    Run,
    Wait,
}

impl HandlerKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Wait => "wait",
        }
    }

    /// Status the dispatch left the task in, and the event that claims it for this job
    fn claim(&self) -> (TaskStatus, TaskEvent) {
        match self {
            Self::Run => (TaskStatus::Initiated, TaskEvent::Begin),
            Self::Wait => (TaskStatus::RunningWaitInitiated, TaskEvent::BeginWait),
        }
    }
}

pub struct JobRunner {
    executor: Arc<WorkflowExecutor>,
    manager: Arc<WorkflowManager>,
    reporter: TaskReporter,
    registry: Arc<TaskRegistry>,
    store: Arc<dyn WorkflowStore>,
}

impl JobRunner {
    pub fn new(
        executor: Arc<WorkflowExecutor>,
        manager: Arc<WorkflowManager>,
        registry: Arc<TaskRegistry>,
        store: Arc<dyn WorkflowStore>,
    ) -> Self {
        Self {
            executor,
            manager,
            reporter: TaskReporter::new(Arc::clone(&store)),
            registry,
            store,
        }
    }

    #[instrument(skip(self, job), fields(job = job.name()))]
    pub async fn process(&self, job: Job) -> Result<()> {
        match job {
            Job::ManageWorkflows => {
                self.manager.sweep().await?;
            }
            Job::ExecuteWorkflow { workflow_id } => {
                self.executor.execute(workflow_id).await?;
            }
            Job::RunTask { task_id, key } => {
                self.run_handler(task_id, key, HandlerKind::Run).await?;
            }
            Job::WaitTask { task_id, key } => {
                self.run_handler(task_id, key, HandlerKind::Wait).await?;
            }
        }
        Ok(())
    }

    /// Claim the task with a compare-and-set, run its handler, report against the claim
    async fn run_handler(&self, task_id: Uuid, key: HandlerKey, kind: HandlerKind) -> Result<()> {
        let (dispatched, claim) = kind.claim();
        let Some(claimed) = self
            .reporter
            .report_if_status(task_id, dispatched, claim)
            .await?
        else {
            debug!(task_id = %task_id, handler = kind.as_str(), "Task moved on, skipping duplicate delivery");
            return Ok(());
        };

        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;

        let handler = match kind {
            HandlerKind::Run => self.registry.run_handler(&key),
            HandlerKind::Wait => self.registry.wait_handler(&key),
        };

        let event = match handler {
            None => TaskEvent::Fail(format!(
                "Internal error: no {} handler registered for {key}",
                kind.as_str()
            )),
            Some(handler) => match AssertUnwindSafe(handler.handle(&task)).catch_unwind().await {
                Ok(Ok(outcome)) => outcome.into_event(),
                Ok(Err(err)) => TaskEvent::Fail(format!("{err:#}")),
                Err(panic) => TaskEvent::Fail(format!(
                    "{} handler panicked: {}",
                    kind.as_str(),
                    panic_message(panic.as_ref())
                )),
            },
        };

        match self.reporter.report_if_status(task_id, claimed, event).await? {
            Some(status) => debug!(
                task_id = %task_id,
                handler = kind.as_str(),
                status = %status,
                "Handler finished"
            ),
            None => warn!(
                task_id = %task_id,
                handler = kind.as_str(),
                claimed = %claimed,
                "Task moved on while its handler ran, outcome dropped"
            ),
        }
        Ok(())
    }

    /// Undo the dispatch marker of a job that was enqueued but will never run
    pub async fn abandon(&self, job: Job) -> Result<()> {
        let (task_id, kind) = match job {
            Job::RunTask { task_id, .. } => (task_id, HandlerKind::Run),
            Job::WaitTask { task_id, .. } => (task_id, HandlerKind::Wait),
            // Sweep and tick jobs hold no state; the next sweep enqueues them again
            Job::ManageWorkflows | Job::ExecuteWorkflow { .. } => return Ok(()),
        };
        let (dispatched, _) = kind.claim();
        if let Some(status) = self
            .reporter
            .report_if_status(task_id, dispatched, TaskEvent::RevertDispatch)
            .await?
        {
            debug!(task_id = %task_id, handler = kind.as_str(), status = %status, "Reverted undelivered dispatch");
        }
        Ok(())
    }
}

/// Queue consumer with bounded concurrency
pub struct Worker {
    runner: Arc<JobRunner>,
    concurrency: usize,
}

impl Worker {
    pub fn new(runner: Arc<JobRunner>, concurrency: usize) -> Self {
        Self {
            runner,
            concurrency: concurrency.max(1),
        }
    }

    /// Consume jobs until shutdown or until the queue closes, then drain in-flight jobs.
    ///
    /// Jobs still buffered after the drain are abandoned: their tasks go back to the status the
    /// reconciler dispatches from, so a later tick picks them up again.
    pub async fn run(self, mut jobs: JobReceiver, mut shutdown: broadcast::Receiver<()>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();
        info!(concurrency = self.concurrency, "Worker started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let runner = Arc::clone(&self.runner);
            in_flight.spawn(async move {
                let _permit = permit;
                let name = job.name();
                if let Err(err) = runner.process(job).await {
                    warn!(job = name, error = %err, "Job failed");
                }
            });

            while let Some(result) = in_flight.try_join_next() {
                log_join(result);
            }
        }

        jobs.close();
        debug!(in_flight = in_flight.len(), "Worker draining in-flight jobs");
        while let Some(result) = in_flight.join_next().await {
            log_join(result);
        }

        let mut abandoned = 0;
        while let Some(job) = jobs.try_recv() {
            let name = job.name();
            if let Err(err) = self.runner.abandon(job).await {
                warn!(job = name, error = %err, "Failed to revert undelivered job");
            }
            abandoned += 1;
        }
        info!(abandoned, "Worker stopped");
    }
}

fn log_join(result: std::result::Result<(), JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "Job task aborted");
    }
}

/// Enqueue a scheduler sweep every `interval` until shutdown
pub fn spawn_manager_loop(
    dispatcher: Arc<dyn Dispatcher>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(err) = dispatcher.dispatch(Job::ManageWorkflows).await {
                        warn!(error = %err, "Failed to enqueue workflow sweep");
                    }
                }
            }
        }
        debug!("Manager loop stopped");
    })
}
