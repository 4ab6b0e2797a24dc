//! # Registry Module
//!
//! Startup-validated mapping from resource and task type to the handlers that execute tasks.

pub mod task_handler_registry;

pub use task_handler_registry::{
    HandlerKey, HandlerOutcome, TaskHandler, TaskHandlers, TaskRegistry, TaskRegistryBuilder,
};
