#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provisioner Core
//!
//! Workflow engine for long-running infrastructure provisioning.
//!
//! ## Overview
//!
//! A provisioning request becomes a **workflow**: a DAG of **tasks**, each creating, updating,
//! attaching or tearing down one cloud resource. Handlers registered per resource and task type
//! do the actual work, often in two phases (start the operation, then poll until it settles).
//!
//! Nothing holds a workflow in memory between steps. A periodic sweep enqueues reconciler ticks;
//! each tick claims the workflow, reads its persisted tasks, dispatches whatever became ready,
//! and releases the claim. Every state change is a compare-and-set against the store, so
//! duplicate deliveries and concurrent workers are harmless.
//!
//! ## Callbacks
//!
//! A workflow may carry ON_SUCCESS and ON_FAILURE callback workflows. They are stored ON_HOLD
//! and released when the parent resolves; the parent then stays in a callbacks-pending status
//! until every released callback has finished.
//!
//! ## Module Organization
//!
//! - [`models`] - Workflow and task records
//! - [`state_machine`] - Status enums and transition tables
//! - [`store`] - Persistence boundary with Postgres and in-memory backends
//! - [`registry`] - Handler registration and startup validation
//! - [`messaging`] - Job messages and the queue boundary
//! - [`orchestration`] - Sweep, reconciler tick, callbacks and workers
//! - [`events`] - Lifecycle event broadcast
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provisioner_core::config::ConfigManager;
//! use provisioner_core::models::TaskType;
//! use provisioner_core::orchestration::{store_from_config, OrchestrationSystem, WorkflowBuilder};
//! use provisioner_core::registry::TaskRegistry;
//! use provisioner_core::models::WorkflowNature;
//!
//! # async fn example(registry: TaskRegistry) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//! provisioner_core::logging::init_structured_logging(&config.logging, manager.environment());
//!
//! let store = store_from_config(config).await?;
//! let system = OrchestrationSystem::start(config, store, registry).await?;
//!
//! let graph = WorkflowBuilder::new("create-network", WorkflowNature::Create, "project-1")
//!     .task("vpc", "VPC", TaskType::Create)
//!     .task("subnet", "SUBNET", TaskType::Create)
//!     .depends_on("subnet", "vpc")
//!     .build()?;
//! system.submit(&graph).await?;
//!
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                   # Unit and in-memory integration tests
//! cargo test --features integration-postgres   # Adds the Postgres store suite
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, EngineConfig};
pub use constants::{status_groups, system};
// Re-export constants events with different name to avoid conflict
pub use constants::events as lifecycle_events;
pub use error::{EngineError, Result};
pub use events::{EventPublisher, LifecycleEvent};
pub use messaging::{Dispatcher, Job};
pub use models::{ResourceType, RootType, Task, TaskType, Workflow, WorkflowNature};
pub use orchestration::{
    OrchestrationHandle, OrchestrationSystem, WorkflowBuilder, WorkflowExecutor, WorkflowManager,
};
pub use registry::{HandlerKey, HandlerOutcome, TaskHandler, TaskRegistry};
pub use state_machine::{TaskEvent, TaskStatus, WorkflowEvent, WorkflowStatus};
pub use store::{MemoryWorkflowStore, WorkflowStore};
