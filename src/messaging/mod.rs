//! # Messaging Module
//!
//! Job messages and the queue boundary used to fan out reconciler ticks and task handlers.

pub mod errors;
pub mod message;
pub mod queue;

pub use errors::DispatchError;
pub use message::Job;
pub use queue::{Dispatcher, JobQueue, JobReceiver, QueueDispatcher, RecordingDispatcher};
