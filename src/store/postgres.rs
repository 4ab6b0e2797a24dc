//! PostgreSQL store.
//!
//! Statuses are stored as their SCREAMING_SNAKE_CASE text. Edges live in `task_edges` with the
//! position on each end so both adjacency lists come back in authored order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ExecutorClaim, StoreError, StoreResult, TaskUpdate, WorkflowStore};
use crate::config::{ConfigurationError, DatabaseConfig};
use crate::constants::status_groups::SCHEDULABLE_WORKFLOW_STATUSES;
use crate::models::{ResourceType, Task, Workflow};
use crate::state_machine::{TaskStatus, WorkflowStatus};

const WORKFLOW_COLUMNS: &str = "workflow_id, name, nature, project_id, status, executor_running, \
     status_holding_callbacks_count, root_type, parent_workflow_id, request_payload, \
     created_at, updated_at, completed_at";

const TASK_COLUMNS: &str = "task_id, workflow_id, resource_type, task_type, status, in_focus, \
     resource_id, message, task_metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct WorkflowRow {
    workflow_id: Uuid,
    name: String,
    nature: String,
    project_id: String,
    status: String,
    executor_running: bool,
    status_holding_callbacks_count: i32,
    root_type: String,
    parent_workflow_id: Option<Uuid>,
    request_payload: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> StoreResult<Self> {
        Ok(Workflow {
            workflow_id: row.workflow_id,
            name: row.name,
            nature: parse_column(&row.nature)?,
            project_id: row.project_id,
            status: parse_column(&row.status)?,
            executor_running: row.executor_running,
            status_holding_callbacks_count: row.status_holding_callbacks_count,
            root_type: parse_column(&row.root_type)?,
            parent_workflow_id: row.parent_workflow_id,
            request_payload: row.request_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: Uuid,
    workflow_id: Uuid,
    resource_type: String,
    task_type: String,
    status: String,
    in_focus: bool,
    resource_id: Option<String>,
    message: Option<String>,
    task_metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> StoreResult<Self> {
        Ok(Task {
            task_id: row.task_id,
            workflow_id: row.workflow_id,
            resource_type: ResourceType::new(row.resource_type),
            task_type: parse_column(&row.task_type)?,
            status: parse_column(&row.status)?,
            in_focus: row.in_focus,
            resource_id: row.resource_id,
            message: row.message,
            task_metadata: row.task_metadata,
            previous_task_ids: Vec::new(),
            next_task_ids: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct EdgeRow {
    predecessor_id: Uuid,
    successor_id: Uuid,
    predecessor_position: i32,
    successor_position: i32,
}

fn parse_column<T>(value: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(StoreError::Corrupt)
}

fn position_column(position: usize) -> StoreResult<i32> {
    i32::try_from(position)
        .map_err(|_| StoreError::Corrupt(format!("position {position} does not fit INTEGER")))
}

/// Merge both adjacency lists into edge rows, keeping the position on each end
fn collect_edges(tasks: &[Task]) -> StoreResult<Vec<EdgeRow>> {
    let mut edges: BTreeMap<(Uuid, Uuid), (i32, i32)> = BTreeMap::new();
    for task in tasks {
        for (position, successor) in task.next_task_ids.iter().enumerate() {
            edges.entry((task.task_id, *successor)).or_default().1 = position_column(position)?;
        }
        for (position, predecessor) in task.previous_task_ids.iter().enumerate() {
            edges.entry((*predecessor, task.task_id)).or_default().0 = position_column(position)?;
        }
    }
    Ok(edges
        .into_iter()
        .map(
            |((predecessor_id, successor_id), (predecessor_position, successor_position))| EdgeRow {
                predecessor_id,
                successor_id,
                predecessor_position,
                successor_position,
            },
        )
        .collect())
}

/// Attach edges to loaded task rows
fn assemble_tasks(rows: Vec<TaskRow>, mut edges: Vec<EdgeRow>) -> StoreResult<Vec<Task>> {
    let mut tasks = rows
        .into_iter()
        .map(Task::try_from)
        .collect::<StoreResult<Vec<_>>>()?;
    let index: HashMap<Uuid, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| (task.task_id, i))
        .collect();

    edges.sort_by_key(|edge| edge.predecessor_position);
    for edge in &edges {
        if let Some(&i) = index.get(&edge.successor_id) {
            tasks[i].previous_task_ids.push(edge.predecessor_id);
        }
    }
    edges.sort_by_key(|edge| edge.successor_position);
    for edge in &edges {
        if let Some(&i) = index.get(&edge.predecessor_id) {
            tasks[i].next_task_ids.push(edge.successor_id);
        }
    }
    Ok(tasks)
}

/// `WorkflowStore` over a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> crate::Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| ConfigurationError::MissingField("database.url".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(url)
            .await
            .map_err(StoreError::from)?;

        info!(
            max_connections = config.max_connections,
            "Connected workflow store"
        );
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Workflow store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create_workflow(&self, workflow: &Workflow, tasks: &[Task]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows (
                workflow_id, name, nature, project_id, status, executor_running,
                status_holding_callbacks_count, root_type, parent_workflow_id, request_payload,
                created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(workflow.workflow_id)
        .bind(&workflow.name)
        .bind(workflow.nature.as_str())
        .bind(&workflow.project_id)
        .bind(workflow.status.as_str())
        .bind(workflow.executor_running)
        .bind(workflow.status_holding_callbacks_count)
        .bind(workflow.root_type.as_str())
        .bind(workflow.parent_workflow_id)
        .bind(&workflow.request_payload)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .bind(workflow.completed_at)
        .execute(&mut *tx)
        .await?;

        for (position, task) in tasks.iter().enumerate() {
            if task.workflow_id != workflow.workflow_id {
                return Err(StoreError::Conflict(format!(
                    "task {} belongs to workflow {}",
                    task.task_id, task.workflow_id
                )));
            }
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    task_id, workflow_id, position, resource_type, task_type, status, in_focus,
                    resource_id, message, task_metadata, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(task.task_id)
            .bind(task.workflow_id)
            .bind(position_column(position)?)
            .bind(task.resource_type.as_str())
            .bind(task.task_type.as_str())
            .bind(task.status.as_str())
            .bind(task.in_focus)
            .bind(&task.resource_id)
            .bind(&task.message)
            .bind(&task.task_metadata)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for edge in collect_edges(tasks)? {
            sqlx::query(
                r#"
                INSERT INTO task_edges (
                    predecessor_id, successor_id, predecessor_position, successor_position
                )
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(edge.predecessor_id)
            .bind(edge.successor_id)
            .bind(edge.predecessor_position)
            .bind(edge.successor_position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_workflow(&self, workflow_id: Uuid) -> StoreResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE workflow_id = $1"
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workflow::try_from).transpose()
    }

    async fn delete_workflow(&self, workflow_id: Uuid) -> StoreResult<bool> {
        // Tasks, edges and callback workflows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM workflows WHERE workflow_id = $1")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_schedulable_workflows(&self) -> StoreResult<Vec<Workflow>> {
        let statuses: Vec<String> = SCHEDULABLE_WORKFLOW_STATUSES
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE executor_running = FALSE AND status = ANY($1)
            ORDER BY workflow_id
            "#
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Workflow::try_from).collect()
    }

    async fn list_callback_workflows(&self, parent_workflow_id: Uuid) -> StoreResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE parent_workflow_id = $1 ORDER BY workflow_id"
        ))
        .bind(parent_workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Workflow::try_from).collect()
    }

    async fn try_claim_executor(&self, workflow_id: Uuid) -> StoreResult<ExecutorClaim> {
        // Read and set happen in one statement, so two ticks can never both see `false`
        let claimed = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            UPDATE workflows
            SET executor_running = TRUE, updated_at = NOW()
            WHERE workflow_id = $1 AND executor_running = FALSE
            RETURNING {WORKFLOW_COLUMNS}
            "#
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = claimed {
            return Ok(ExecutorClaim::Acquired(Workflow::try_from(row)?));
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM workflows WHERE workflow_id = $1)")
                .bind(workflow_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(if exists {
            ExecutorClaim::AlreadyRunning
        } else {
            ExecutorClaim::NotFound
        })
    }

    async fn release_executor(&self, workflow_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE workflows SET executor_running = FALSE, updated_at = NOW() WHERE workflow_id = $1",
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition_workflow_status(
        &self,
        workflow_id: Uuid,
        expected: WorkflowStatus,
        next: WorkflowStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET status = $3,
                updated_at = NOW(),
                completed_at = CASE WHEN $4 THEN COALESCE(completed_at, NOW()) ELSE completed_at END
            WHERE workflow_id = $1 AND status = $2
            "#,
        )
        .bind(workflow_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(next.is_terminal())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_workflow(
        &self,
        workflow_id: Uuid,
        status: WorkflowStatus,
        holding_callbacks: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET status = $2,
                status_holding_callbacks_count = $3,
                updated_at = NOW(),
                completed_at = NOW()
            WHERE workflow_id = $1 AND status = $4
            "#,
        )
        .bind(workflow_id)
        .bind(status.as_str())
        .bind(holding_callbacks)
        .bind(WorkflowStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn decrement_holding_callbacks(&self, workflow_id: Uuid) -> StoreResult<Option<i32>> {
        let remaining = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE workflows
            SET status_holding_callbacks_count = GREATEST(status_holding_callbacks_count - 1, 0),
                updated_at = NOW()
            WHERE workflow_id = $1
            RETURNING status_holding_callbacks_count
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(remaining)
    }

    async fn find_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        let Some(row) = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let edges = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT predecessor_id, successor_id, predecessor_position, successor_position
            FROM task_edges
            WHERE predecessor_id = $1 OR successor_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assemble_tasks(vec![row], edges)?.pop())
    }

    async fn list_tasks(&self, workflow_id: Uuid) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE workflow_id = $1 ORDER BY position"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        let edges = sqlx::query_as::<_, EdgeRow>(
            r#"
            SELECT e.predecessor_id, e.successor_id, e.predecessor_position, e.successor_position
            FROM task_edges e
            JOIN tasks t ON t.task_id = e.successor_id
            WHERE t.workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        assemble_tasks(rows, edges)
    }

    async fn update_task_if_status(
        &self,
        task_id: Uuid,
        expected: TaskStatus,
        update: &TaskUpdate,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = COALESCE($3, status),
                in_focus = COALESCE($4, in_focus),
                message = COALESCE($5, message),
                resource_id = COALESCE($6, resource_id),
                updated_at = NOW()
            WHERE task_id = $1 AND status = $2
            "#,
        )
        .bind(task_id)
        .bind(expected.as_str())
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.in_focus)
        .bind(&update.message)
        .bind(&update.resource_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tasks WHERE task_id = $1)")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound {
                entity: "task",
                id: task_id,
            })
        }
    }
}
