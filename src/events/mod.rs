//! # Events Module
//!
//! Lifecycle notifications for workflows and tasks, fanned out over a broadcast channel.

pub mod publisher;

pub use publisher::{EventPublisher, LifecycleEvent};
