//! # Orchestration Bootstrap
//!
//! Wires a store, a validated handler registry and the configuration into a running system:
//! one in-process job queue, a [`Worker`] draining it, and the periodic sweep loop.
//!
//! ```rust,no_run
//! use provisioner_core::config::EngineConfig;
//! use provisioner_core::orchestration::{store_from_config, OrchestrationSystem};
//! use provisioner_core::registry::TaskRegistry;
//!
//! # async fn example(registry: TaskRegistry) -> provisioner_core::Result<()> {
//! let config = EngineConfig::default();
//! let store = store_from_config(&config).await?;
//! let handle = OrchestrationSystem::start(&config, store, registry).await?;
//! // ... submit workflows ...
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use super::worker::{spawn_manager_loop, JobRunner, Worker};
use super::workflow_builder::WorkflowGraph;
use super::workflow_executor::WorkflowExecutor;
use super::workflow_manager::WorkflowManager;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::EventPublisher;
use crate::messaging::{Dispatcher, JobQueue};
use crate::registry::TaskRegistry;
use crate::store::{MemoryWorkflowStore, WorkflowStore};

pub struct OrchestrationSystem;

impl OrchestrationSystem {
    /// Validate `config` and start the worker and sweep loop on the current runtime
    pub async fn start(
        config: &EngineConfig,
        store: Arc<dyn WorkflowStore>,
        registry: TaskRegistry,
    ) -> Result<OrchestrationHandle> {
        config.validate()?;

        let registry = Arc::new(registry);
        let events = EventPublisher::new(config.events.channel_capacity);
        let (queue, receiver) = JobQueue::bounded(config.worker.queue_capacity);
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(queue);

        let executor = Arc::new(
            WorkflowExecutor::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                Arc::clone(&dispatcher),
                events.clone(),
            )
            .with_release_attempts(config.worker.executor_release_attempts),
        );
        let manager = Arc::new(WorkflowManager::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            events.clone(),
        ));
        let runner = Arc::new(JobRunner::new(
            executor,
            manager,
            Arc::clone(&registry),
            Arc::clone(&store),
        ));

        let (shutdown_sender, _) = broadcast::channel(1);
        let worker = Worker::new(runner, config.worker.concurrency);
        let worker_handle = tokio::spawn(worker.run(receiver, shutdown_sender.subscribe()));
        let manager_handle = spawn_manager_loop(
            Arc::clone(&dispatcher),
            config.scheduler.sweep_interval(),
            shutdown_sender.subscribe(),
        );

        info!(
            environment = %config.environment,
            concurrency = config.worker.concurrency,
            sweep_interval_ms = config.scheduler.sweep_interval_ms,
            handlers = registry.len(),
            "Orchestration system started"
        );

        Ok(OrchestrationHandle {
            store,
            registry,
            dispatcher,
            events,
            shutdown_sender,
            worker_handle,
            manager_handle,
        })
    }
}

/// Postgres when `database.url` is set, in-memory otherwise
pub async fn store_from_config(config: &EngineConfig) -> Result<Arc<dyn WorkflowStore>> {
    if config.database.url.is_some() {
        return connect_database(config).await;
    }
    info!("No database configured, using in-memory workflow store");
    Ok(Arc::new(MemoryWorkflowStore::new()))
}

#[cfg(feature = "postgres")]
async fn connect_database(config: &EngineConfig) -> Result<Arc<dyn WorkflowStore>> {
    let store = crate::store::PgWorkflowStore::connect(&config.database).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(_config: &EngineConfig) -> Result<Arc<dyn WorkflowStore>> {
    tracing::warn!("database.url is set but postgres support is not compiled in, using memory store");
    Ok(Arc::new(MemoryWorkflowStore::new()))
}

/// Running system; dropping it without [`OrchestrationHandle::shutdown`] leaves the loops running
pub struct OrchestrationHandle {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<TaskRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    events: EventPublisher,
    shutdown_sender: broadcast::Sender<()>,
    worker_handle: JoinHandle<()>,
    manager_handle: JoinHandle<()>,
}

impl OrchestrationHandle {
    pub fn store(&self) -> Arc<dyn WorkflowStore> {
        Arc::clone(&self.store)
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Check handler coverage and persist `graph`; the next sweep picks it up
    pub async fn submit(&self, graph: &WorkflowGraph) -> Result<Uuid> {
        graph.validate_handlers(&self.registry)?;
        graph.persist(self.store.as_ref()).await
    }

    /// Stop the sweep loop, let in-flight jobs finish, and wait for both loops to exit
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down orchestration system");
        // Err only means both loops already exited
        let _ = self.shutdown_sender.send(());

        self.manager_handle
            .await
            .map_err(|err| EngineError::Internal(format!("manager loop aborted: {err}")))?;
        self.worker_handle
            .await
            .map_err(|err| EngineError::Internal(format!("worker aborted: {err}")))?;

        info!("Orchestration system stopped");
        Ok(())
    }
}
