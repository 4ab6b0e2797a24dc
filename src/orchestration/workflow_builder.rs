//! # Workflow Builder
//!
//! Authoring API for a workflow, its task DAG and its callback workflows. Tasks are declared
//! under caller-chosen local keys; `build` turns keys into ids, checks the graph and produces a
//! [`WorkflowGraph`] ready to persist.
//!
//! ```rust,ignore
//! let graph = WorkflowBuilder::new("create-network", WorkflowNature::Create, "project-1")
//!     .task("vpc", "VPC", TaskType::Create)
//!     .task("subnet", "SUBNET", TaskType::Create)
//!     .depends_on("subnet", "vpc")
//!     .on_failure(
//!         WorkflowBuilder::new("rollback-network", WorkflowNature::Delete, "project-1")
//!             .task("vpc", "VPC", TaskType::Delete),
//!     )
//!     .build()?;
//!
//! graph.validate_handlers(&registry)?;
//! graph.persist(store.as_ref()).await?;
//! ```

use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use super::dependency_graph::DependencyGraph;
use crate::error::{EngineError, Result};
use crate::models::{ResourceType, RootType, Task, TaskType, Workflow, WorkflowNature};
use crate::registry::TaskRegistry;
use crate::state_machine::WorkflowStatus;
use crate::store::WorkflowStore;

#[derive(Debug, Clone)]
struct TaskSpec {
    key: String,
    resource_type: ResourceType,
    task_type: TaskType,
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    nature: WorkflowNature,
    project_id: String,
    request_payload: Option<serde_json::Value>,
    tasks: Vec<TaskSpec>,
    /// (task, predecessor)
    edges: Vec<(String, String)>,
    on_success: Vec<WorkflowBuilder>,
    on_failure: Vec<WorkflowBuilder>,
}

impl WorkflowBuilder {
    pub fn new(
        name: impl Into<String>,
        nature: WorkflowNature,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            nature,
            project_id: project_id.into(),
            request_payload: None,
            tasks: Vec::new(),
            edges: Vec::new(),
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn request_payload(mut self, payload: serde_json::Value) -> Self {
        self.request_payload = Some(payload);
        self
    }

    pub fn task(
        self,
        key: impl Into<String>,
        resource_type: impl Into<ResourceType>,
        task_type: TaskType,
    ) -> Self {
        self.push_task(key.into(), resource_type.into(), task_type, None)
    }

    /// Task carrying handler input
    pub fn task_with_metadata(
        self,
        key: impl Into<String>,
        resource_type: impl Into<ResourceType>,
        task_type: TaskType,
        metadata: serde_json::Value,
    ) -> Self {
        self.push_task(key.into(), resource_type.into(), task_type, Some(metadata))
    }

    fn push_task(
        mut self,
        key: String,
        resource_type: ResourceType,
        task_type: TaskType,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        self.tasks.push(TaskSpec {
            key,
            resource_type,
            task_type,
            metadata,
        });
        self
    }

    /// `task` may only start once `predecessor` is SUCCESSFUL
    pub fn depends_on(mut self, task: impl Into<String>, predecessor: impl Into<String>) -> Self {
        self.edges.push((task.into(), predecessor.into()));
        self
    }

    /// Callback workflow released when this workflow completes without failed tasks
    pub fn on_success(mut self, callback: WorkflowBuilder) -> Self {
        self.on_success.push(callback);
        self
    }

    /// Callback workflow released when this workflow completes with failed tasks
    pub fn on_failure(mut self, callback: WorkflowBuilder) -> Self {
        self.on_failure.push(callback);
        self
    }

    pub fn build(self) -> Result<WorkflowGraph> {
        self.build_with_parent(None)
    }

    fn build_with_parent(self, parent: Option<(Uuid, RootType)>) -> Result<WorkflowGraph> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation(
                "Workflow name must not be empty".to_string(),
            ));
        }

        let mut workflow = match parent {
            Some((parent_id, root_type)) => Workflow::new_callback(
                self.name,
                self.nature,
                self.project_id,
                parent_id,
                root_type,
            ),
            None => Workflow::new(self.name, self.nature, self.project_id),
        };
        workflow.request_payload = self.request_payload;
        let workflow_id = workflow.workflow_id;

        let mut task_keys: HashMap<String, Uuid> = HashMap::new();
        let mut tasks: Vec<Task> = Vec::with_capacity(self.tasks.len());
        for spec in self.tasks {
            if task_keys.contains_key(&spec.key) {
                return Err(EngineError::Validation(format!(
                    "Duplicate task key '{}' in workflow '{}'",
                    spec.key, workflow.name
                )));
            }
            let mut task = Task::new(workflow_id, spec.resource_type, spec.task_type);
            task.task_metadata = spec.metadata;
            task_keys.insert(spec.key, task.task_id);
            tasks.push(task);
        }

        let index: HashMap<Uuid, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.task_id, i))
            .collect();
        let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
        for (task_key, predecessor_key) in &self.edges {
            if task_key == predecessor_key {
                return Err(EngineError::Validation(format!(
                    "Task '{task_key}' cannot depend on itself"
                )));
            }
            let task_id = resolve_key(&task_keys, task_key)?;
            let predecessor_id = resolve_key(&task_keys, predecessor_key)?;
            if !seen.insert((predecessor_id, task_id)) {
                continue;
            }
            tasks[index[&task_id]].previous_task_ids.push(predecessor_id);
            tasks[index[&predecessor_id]].next_task_ids.push(task_id);
        }

        if let Some(task_id) = DependencyGraph::from_tasks(&tasks).cycle_member() {
            let key = task_keys
                .iter()
                .find(|(_, id)| **id == task_id)
                .map(|(key, _)| key.clone())
                .unwrap_or_else(|| task_id.to_string());
            return Err(EngineError::CycleDetected(key));
        }

        let callbacks = self
            .on_success
            .into_iter()
            .map(|cb| cb.build_with_parent(Some((workflow_id, RootType::OnSuccessCallback))))
            .chain(
                self.on_failure
                    .into_iter()
                    .map(|cb| cb.build_with_parent(Some((workflow_id, RootType::OnFailureCallback)))),
            )
            .collect::<Result<Vec<_>>>()?;

        Ok(WorkflowGraph {
            workflow,
            tasks,
            task_keys,
            callbacks,
        })
    }
}

fn resolve_key(task_keys: &HashMap<String, Uuid>, key: &str) -> Result<Uuid> {
    task_keys.get(key).copied().ok_or_else(|| {
        EngineError::Validation(format!("Unknown task key '{key}' in dependency"))
    })
}

/// Validated workflow with its tasks and callback workflows, not yet persisted
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub workflow: Workflow,
    pub tasks: Vec<Task>,
    task_keys: HashMap<String, Uuid>,
    pub callbacks: Vec<WorkflowGraph>,
}

impl WorkflowGraph {
    pub fn workflow_id(&self) -> Uuid {
        self.workflow.workflow_id
    }

    /// Id assigned to a local task key
    pub fn task_id(&self, key: &str) -> Option<Uuid> {
        self.task_keys.get(key).copied()
    }

    /// Tasks of this workflow and every callback below it
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        for callback in &self.callbacks {
            tasks.extend(callback.all_tasks());
        }
        tasks
    }

    /// Fail fast when any task, callbacks included, has no run handler
    pub fn validate_handlers(&self, registry: &TaskRegistry) -> Result<()> {
        registry.ensure_covers(self.all_tasks())
    }

    /// Write the root ON_HOLD, then its callbacks depth-first, then release the root.
    ///
    /// The sweep never sees a root whose callbacks are not all stored yet. A failed write
    /// removes whatever was already persisted. Returns the root workflow id.
    pub async fn persist(&self, store: &dyn WorkflowStore) -> Result<Uuid> {
        let workflow_id = self.workflow_id();
        let mut held = self.workflow.clone();
        held.status = WorkflowStatus::OnHold;
        store.create_workflow(&held, &self.tasks).await?;

        if let Err(err) = self.persist_callbacks(store).await {
            if let Err(cleanup) = store.delete_workflow(workflow_id).await {
                warn!(
                    workflow_id = %workflow_id,
                    error = %cleanup,
                    "Failed to remove partially persisted workflow"
                );
            }
            return Err(err);
        }

        if self.workflow.status != WorkflowStatus::OnHold
            && !store
                .transition_workflow_status(workflow_id, WorkflowStatus::OnHold, self.workflow.status)
                .await?
        {
            return Err(EngineError::Internal(format!(
                "workflow {workflow_id} left ON_HOLD before it was released"
            )));
        }
        Ok(workflow_id)
    }

    async fn persist_callbacks(&self, store: &dyn WorkflowStore) -> Result<()> {
        let mut pending: Vec<&WorkflowGraph> = self.callbacks.iter().rev().collect();
        while let Some(graph) = pending.pop() {
            store.create_workflow(&graph.workflow, &graph.tasks).await?;
            pending.extend(graph.callbacks.iter().rev());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::TaskStatus;
    use crate::store::{
        ExecutorClaim, MemoryWorkflowStore, StoreError, StoreResult, TaskUpdate,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn network() -> WorkflowBuilder {
        WorkflowBuilder::new("create-network", WorkflowNature::Create, "project-1")
            .task("vpc", "VPC", TaskType::Create)
            .task("subnet-a", "SUBNET", TaskType::Create)
            .task("subnet-b", "SUBNET", TaskType::Create)
            .task("instance", "INSTANCE", TaskType::Create)
            .depends_on("subnet-a", "vpc")
            .depends_on("subnet-b", "vpc")
            .depends_on("instance", "subnet-a")
            .depends_on("instance", "subnet-b")
    }

    #[test]
    fn test_build_wires_edges_both_ways() {
        let graph = network().build().unwrap();
        let vpc = graph.task_id("vpc").unwrap();
        let instance = graph.task_id("instance").unwrap();

        let vpc_task = graph.tasks.iter().find(|t| t.task_id == vpc).unwrap();
        assert_eq!(
            vpc_task.next_task_ids,
            vec![graph.task_id("subnet-a").unwrap(), graph.task_id("subnet-b").unwrap()]
        );
        let instance_task = graph.tasks.iter().find(|t| t.task_id == instance).unwrap();
        assert_eq!(instance_task.previous_task_ids.len(), 2);
        assert!(graph.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(graph.workflow.status, WorkflowStatus::Pending);
    }

    #[test]
    fn test_build_rejects_bad_graphs() {
        let duplicate = network().task("vpc", "VPC", TaskType::Update).build();
        assert!(matches!(duplicate, Err(EngineError::Validation(_))));

        let unknown = network().depends_on("instance", "gateway").build();
        assert!(matches!(unknown, Err(EngineError::Validation(msg)) if msg.contains("gateway")));

        let self_edge = network().depends_on("vpc", "vpc").build();
        assert!(matches!(self_edge, Err(EngineError::Validation(_))));

        let cycle = network().depends_on("vpc", "instance").build();
        assert!(matches!(cycle, Err(EngineError::CycleDetected(_))));
    }

    #[test]
    fn test_callbacks_start_on_hold_under_parent() {
        let graph = network()
            .on_success(
                WorkflowBuilder::new("notify", WorkflowNature::Update, "project-1")
                    .task("tag", "VPC", TaskType::Update),
            )
            .on_failure(
                WorkflowBuilder::new("rollback", WorkflowNature::Delete, "project-1")
                    .task("vpc", "VPC", TaskType::Delete),
            )
            .build()
            .unwrap();

        assert_eq!(graph.callbacks.len(), 2);
        for callback in &graph.callbacks {
            assert_eq!(callback.workflow.status, WorkflowStatus::OnHold);
            assert_eq!(callback.workflow.parent_workflow_id, Some(graph.workflow_id()));
        }
        assert_eq!(graph.callbacks[0].workflow.root_type, RootType::OnSuccessCallback);
        assert_eq!(graph.callbacks[1].workflow.root_type, RootType::OnFailureCallback);
        assert_eq!(graph.all_tasks().len(), 6);
    }

    #[tokio::test]
    async fn test_persist_writes_root_and_callbacks() {
        let store = MemoryWorkflowStore::new();
        let graph = network()
            .on_failure(
                WorkflowBuilder::new("rollback", WorkflowNature::Delete, "project-1")
                    .task("vpc", "VPC", TaskType::Delete),
            )
            .build()
            .unwrap();

        let workflow_id = graph.persist(&store).await.unwrap();
        assert_eq!(workflow_id, graph.workflow_id());
        assert_eq!(store.list_tasks(workflow_id).await.unwrap().len(), 4);
        assert_eq!(
            store.list_callback_workflows(workflow_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_root_stays_unschedulable_until_callbacks_are_stored() {
        let store = MemoryWorkflowStore::new();
        let graph = network()
            .on_success(
                WorkflowBuilder::new("notify", WorkflowNature::Update, "project-1")
                    .task("tag", "VPC", TaskType::Update),
            )
            .build()
            .unwrap();

        graph.persist(&store).await.unwrap();

        let root = store.find_workflow(graph.workflow_id()).await.unwrap().unwrap();
        assert_eq!(root.status, WorkflowStatus::Pending);
        let callback = store
            .find_workflow(graph.callbacks[0].workflow_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(callback.status, WorkflowStatus::OnHold);
    }

    /// Memory store whose n-th `create_workflow` fails
    struct FailingCreateStore {
        inner: MemoryWorkflowStore,
        fail_on: usize,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowStore for FailingCreateStore {
        async fn create_workflow(&self, workflow: &Workflow, tasks: &[Task]) -> StoreResult<()> {
            if self.creates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Conflict("insert rejected".to_string()));
            }
            // Nothing may be schedulable between the inserts of one graph
            assert!(self.inner.list_schedulable_workflows().await?.is_empty());
            self.inner.create_workflow(workflow, tasks).await
        }

        async fn find_workflow(&self, workflow_id: Uuid) -> StoreResult<Option<Workflow>> {
            self.inner.find_workflow(workflow_id).await
        }

        async fn delete_workflow(&self, workflow_id: Uuid) -> StoreResult<bool> {
            self.inner.delete_workflow(workflow_id).await
        }

        async fn list_schedulable_workflows(&self) -> StoreResult<Vec<Workflow>> {
            self.inner.list_schedulable_workflows().await
        }

        async fn list_callback_workflows(&self, parent_workflow_id: Uuid) -> StoreResult<Vec<Workflow>> {
            self.inner.list_callback_workflows(parent_workflow_id).await
        }

        async fn try_claim_executor(&self, workflow_id: Uuid) -> StoreResult<ExecutorClaim> {
            self.inner.try_claim_executor(workflow_id).await
        }

        async fn release_executor(&self, workflow_id: Uuid) -> StoreResult<()> {
            self.inner.release_executor(workflow_id).await
        }

        async fn transition_workflow_status(
            &self,
            workflow_id: Uuid,
            expected: WorkflowStatus,
            next: WorkflowStatus,
        ) -> StoreResult<bool> {
            self.inner
                .transition_workflow_status(workflow_id, expected, next)
                .await
        }

        async fn complete_workflow(
            &self,
            workflow_id: Uuid,
            status: WorkflowStatus,
            holding_callbacks: i32,
        ) -> StoreResult<bool> {
            self.inner
                .complete_workflow(workflow_id, status, holding_callbacks)
                .await
        }

        async fn decrement_holding_callbacks(&self, workflow_id: Uuid) -> StoreResult<Option<i32>> {
            self.inner.decrement_holding_callbacks(workflow_id).await
        }

        async fn find_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
            self.inner.find_task(task_id).await
        }

        async fn list_tasks(&self, workflow_id: Uuid) -> StoreResult<Vec<Task>> {
            self.inner.list_tasks(workflow_id).await
        }

        async fn update_task_if_status(
            &self,
            task_id: Uuid,
            expected: TaskStatus,
            update: &TaskUpdate,
        ) -> StoreResult<bool> {
            self.inner.update_task_if_status(task_id, expected, update).await
        }
    }

    #[tokio::test]
    async fn test_failed_callback_insert_leaves_nothing_behind() {
        let store = FailingCreateStore {
            inner: MemoryWorkflowStore::new(),
            fail_on: 2,
            creates: AtomicUsize::new(0),
        };
        let graph = network()
            .on_failure(
                WorkflowBuilder::new("rollback", WorkflowNature::Delete, "project-1")
                    .task("vpc", "VPC", TaskType::Delete),
            )
            .build()
            .unwrap();

        let err = graph.persist(&store).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Conflict(_))));

        assert!(store.find_workflow(graph.workflow_id()).await.unwrap().is_none());
        assert!(store.list_schedulable_workflows().await.unwrap().is_empty());
        assert_eq!(store.inner.workflow_count(), 0);
    }
}
