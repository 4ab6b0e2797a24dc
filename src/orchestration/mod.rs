//! # Orchestration
//!
//! The reconciler and the machinery around it.
//!
//! - [`WorkflowManager`]: periodic sweep that moves PENDING workflows to INITIATED and enqueues a tick
//! - [`WorkflowExecutor`]: one stateless reconciler tick per workflow, guarded by the executor claim
//! - [`CallbackCoordinator`]: releases or discards callback workflows when a parent resolves
//! - [`TaskReporter`]: applies handler outcomes to task records
//! - [`Worker`]: bounded-concurrency consumer of the job queue
//! - [`WorkflowBuilder`]: validated construction of workflow DAGs and their callbacks
//!
//! A tick never blocks on a handler. It dispatches jobs and returns; the next tick observes
//! whatever the handlers reported in between.

pub mod bootstrap;
pub mod callback_coordinator;
pub mod dependency_graph;
pub mod task_reporter;
pub mod types;
pub mod worker;
pub mod workflow_builder;
pub mod workflow_executor;
pub mod workflow_manager;

pub use bootstrap::{store_from_config, OrchestrationHandle, OrchestrationSystem};
pub use callback_coordinator::CallbackCoordinator;
pub use dependency_graph::DependencyGraph;
pub use task_reporter::TaskReporter;
pub use types::{SweepReport, TickOutcome, TickReport};
pub use worker::{spawn_manager_loop, JobRunner, Worker};
pub use workflow_builder::{WorkflowBuilder, WorkflowGraph};
pub use workflow_executor::WorkflowExecutor;
pub use workflow_manager::WorkflowManager;
