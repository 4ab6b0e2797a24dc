//! # Job Queue
//!
//! [`Dispatcher`] is the outbound queue boundary. [`JobQueue::bounded`] gives an in-process
//! queue over `tokio::sync::mpsc` for embedded deployments; [`RecordingDispatcher`] only
//! remembers what was enqueued.
//!
//! Dispatch never waits for room. Jobs that dispatch run on the same workers that drain the
//! queue, so a full queue is reported as [`DispatchError::QueueFull`] and the caller backs off.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;
use uuid::Uuid;

use super::errors::DispatchError;
use super::message::Job;

/// Enqueue side of the work queue
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, job: Job) -> Result<(), DispatchError>;
}

/// Constructor for the in-process queue
pub struct JobQueue;

impl JobQueue {
    pub fn bounded(capacity: usize) -> (QueueDispatcher, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (QueueDispatcher { sender }, JobReceiver { receiver })
    }
}

#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    sender: mpsc::Sender<Job>,
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, job: Job) -> Result<(), DispatchError> {
        let name = job.name();
        self.sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => DispatchError::QueueFull { job: name },
            TrySendError::Closed(_) => DispatchError::QueueClosed { job: name },
        })?;
        trace!(job = name, "Job enqueued");
        Ok(())
    }
}

#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::Receiver<Job>,
}

impl JobReceiver {
    /// Next job, or `None` once every dispatcher is dropped and the queue is drained
    pub async fn recv(&mut self) -> Option<Job> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Job> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting new jobs; buffered jobs can still be received
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Dispatcher that keeps every job in memory
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<Job>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    /// Drain recorded jobs
    pub fn take(&self) -> Vec<Job> {
        std::mem::take(&mut *self.jobs.lock())
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn run_task_ids(&self) -> Vec<Uuid> {
        self.jobs
            .lock()
            .iter()
            .filter_map(|job| match job {
                Job::RunTask { task_id, .. } => Some(*task_id),
                _ => None,
            })
            .collect()
    }

    pub fn wait_task_ids(&self) -> Vec<Uuid> {
        self.jobs
            .lock()
            .iter()
            .filter_map(|job| match job {
                Job::WaitTask { task_id, .. } => Some(*task_id),
                _ => None,
            })
            .collect()
    }

    pub fn executed_workflow_ids(&self) -> Vec<Uuid> {
        self.jobs.lock().iter().filter_map(Job::workflow_id).collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: Job) -> Result<(), DispatchError> {
        self.jobs.lock().push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_queue_delivers_in_order() {
        let (dispatcher, mut receiver) = JobQueue::bounded(4);
        let workflow_id = Uuid::now_v7();

        dispatcher.dispatch(Job::ManageWorkflows).await.unwrap();
        dispatcher
            .dispatch(Job::ExecuteWorkflow { workflow_id })
            .await
            .unwrap();

        assert_eq!(receiver.recv().await, Some(Job::ManageWorkflows));
        assert_eq!(
            receiver.recv().await,
            Some(Job::ExecuteWorkflow { workflow_id })
        );
        assert_eq!(receiver.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_jobs() {
        let (dispatcher, mut receiver) = JobQueue::bounded(1);
        receiver.close();

        let err = dispatcher.dispatch(Job::ManageWorkflows).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::QueueClosed {
                job: "workflow_manager"
            }
        ));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_waiting() {
        let (dispatcher, mut receiver) = JobQueue::bounded(1);
        let workflow_id = Uuid::now_v7();

        dispatcher.dispatch(Job::ManageWorkflows).await.unwrap();
        let err = dispatcher
            .dispatch(Job::ExecuteWorkflow { workflow_id })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::QueueFull {
                job: "workflow_executor"
            }
        ));

        assert_eq!(receiver.recv().await, Some(Job::ManageWorkflows));
        dispatcher
            .dispatch(Job::ExecuteWorkflow { workflow_id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recording_dispatcher() {
        let dispatcher = RecordingDispatcher::new();
        let workflow_id = Uuid::now_v7();
        dispatcher
            .dispatch(Job::ExecuteWorkflow { workflow_id })
            .await
            .unwrap();

        assert_eq!(dispatcher.executed_workflow_ids(), vec![workflow_id]);
        assert_eq!(dispatcher.take().len(), 1);
        assert!(dispatcher.is_empty());
    }
}
