//! # Messaging Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Job queue is closed, could not enqueue {job}")]
    QueueClosed { job: &'static str },

    #[error("Job queue is full, could not enqueue {job}")]
    QueueFull { job: &'static str },

    #[error("Job {job} rejected: {message}")]
    Rejected { job: &'static str, message: String },

    #[error("Job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn rejected(job: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            job,
            message: message.into(),
        }
    }
}
