use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::{
    error::{OrchestratorError, Result},
    models::{AgentId, NewTask, OrchestrationLogEntry, Task, TaskFilter, TaskId, TaskStatus},
    repository::{RepositoryStats, TaskRepository},
    validation::TaskValidator,
};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};

use crate::common::{
    build_filter_query, row_to_task, sqlx_error_to_orchestrator_error, status_to_string, string_to_status,
};

/// SQLite-backed [`TaskRepository`] implementation.
///
/// Provides durable persistence with connection pooling, WAL journaling for
/// file-backed databases, and the atomic claim semantics `claim_next_for`
/// requires.
#[derive(Debug, Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Connects to `database_url`, which may be `:memory:`, a bare file path,
    /// or a `sqlite://` URL. Creates the file-backed database if missing.
    ///
    /// ```rust,no_run
    /// use orchestrator_storage::SqliteTaskRepository;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let repo = SqliteTaskRepository::new(":memory:").await?;
    /// repo.migrate().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") {
            database_url.to_string()
        } else if database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            Sqlite::create_database(&db_url)
                .await
                .map_err(|e| OrchestratorError::Storage(format!("failed to create database: {e}")))?;
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        let pool = SqlitePool::connect_with(connect_options)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        Ok(Self { pool })
    }

    /// Applies all pending migrations under `migrations/sqlite`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| OrchestratorError::Storage(format!("migration failed: {e}")))?;
        tracing::info!("database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wraps an already-connected pool, for sharing one database across
    /// multiple repository handles (e.g. one per spawned task).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn log_transition(&self, entity_kind: &str, entity_id: &str, transition: &str, detail: Option<&str>) {
        let result = sqlx::query(
            "INSERT INTO orchestration_log (entity_kind, entity_id, transition, detail, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entity_kind)
        .bind(entity_id)
        .bind(transition)
        .bind(detail)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write orchestration log entry");
        }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn enqueue(&self, task: NewTask) -> Result<Task> {
        TaskValidator::validate_new_task(&task)?;

        let id = TaskId::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, command, repository_path, priority, status, created_at, retry_count,
                correlation_id, workflow_id, parent_task_id, workflow_step_index
            )
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(&id.0)
        .bind(&task.command)
        .bind(&task.repository_path)
        .bind(task.priority)
        .bind(status_to_string(TaskStatus::Pending))
        .bind(now)
        .bind(&task.correlation_id)
        .bind(&task.workflow_id)
        .bind(task.parent_task_id.as_ref().map(|t| t.0.clone()))
        .bind(task.workflow_step_index)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "enqueue", None).await;

        self.get(&id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn claim_next_for(&self, agent_id: &AgentId, repository_path: &str) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_orchestrator_error)?;

        let candidate: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM tasks
            WHERE status = 'pending' AND repository_path = ?
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(repository_path)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        let Some((task_id,)) = candidate else {
            return Ok(None);
        };

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE tasks SET status = 'assigned', agent_id = ?, started_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&agent_id.0)
        .bind(now)
        .bind(&task_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        if updated.rows_affected() == 0 {
            // Another claimant won the race; caller should try again later.
            tx.commit().await.map_err(sqlx_error_to_orchestrator_error)?;
            return Ok(None);
        }

        tx.commit().await.map_err(sqlx_error_to_orchestrator_error)?;
        self.log_transition("task", &task_id, "claim", Some(&agent_id.0)).await;

        self.get(&TaskId(task_id.clone()))
            .await?
            .ok_or_else(|| OrchestratorError::not_found_id(&task_id))
    }

    async fn mark_in_progress(&self, id: &TaskId) -> Result<Task> {
        let task = self.require(id).await?;
        if !task.status.can_transition_to(TaskStatus::InProgress) {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::InProgress));
        }

        sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status_to_string(TaskStatus::InProgress))
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "in_progress", None).await;
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn complete(&self, id: &TaskId, result: String) -> Result<Task> {
        let task = self.require(id).await?;
        if !task.status.can_transition_to(TaskStatus::Completed) {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::Completed));
        }

        let now = Utc::now();
        let duration_ms = task.started_at.map(|s| (now - s).num_milliseconds());

        sqlx::query(
            "UPDATE tasks SET status = ?, result = ?, completed_at = ?, execution_duration_ms = ? WHERE id = ?",
        )
        .bind(status_to_string(TaskStatus::Completed))
        .bind(&result)
        .bind(now)
        .bind(duration_ms)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "complete", None).await;
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn fail(&self, id: &TaskId, error: String) -> Result<Task> {
        let task = self.require(id).await?;
        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::Failed));
        }

        let now = Utc::now();
        let duration_ms = task.started_at.map(|s| (now - s).num_milliseconds());

        sqlx::query(
            "UPDATE tasks SET status = ?, error = ?, completed_at = ?, execution_duration_ms = ? WHERE id = ?",
        )
        .bind(status_to_string(TaskStatus::Failed))
        .bind(&error)
        .bind(now)
        .bind(duration_ms)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "fail", Some(&error)).await;
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn cancel(&self, id: &TaskId) -> Result<Task> {
        let task = self.require(id).await?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::Cancelled));
        }

        sqlx::query("UPDATE tasks SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status_to_string(TaskStatus::Cancelled))
            .bind(Utc::now())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "cancel", None).await;
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn reclaim(&self, id: &TaskId) -> Result<Task> {
        let task = self.require(id).await?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::Pending));
        }

        sqlx::query(
            "UPDATE tasks SET status = ?, agent_id = NULL, started_at = NULL, retry_count = retry_count + 1 WHERE id = ?",
        )
        .bind(status_to_string(TaskStatus::Pending))
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        self.log_transition("task", &id.0, "reclaim", None).await;
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, command, repository_path, priority, status, created_at, started_at, \
             completed_at, execution_duration_ms, result, error, retry_count, correlation_id, \
             workflow_id, parent_task_id, workflow_step_index, agent_id FROM tasks WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut query_builder = build_filter_query(&filter);
        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn list_reclaimable(&self, agent_ids: &[AgentId]) -> Result<Vec<Task>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "SELECT id, command, repository_path, priority, status, created_at, started_at, \
             completed_at, execution_duration_ms, result, error, retry_count, correlation_id, \
             workflow_id, parent_task_id, workflow_step_index, agent_id FROM tasks \
             WHERE status IN ('assigned', 'in_progress') AND agent_id IN (",
        );
        let mut separated = query_builder.separated(", ");
        for agent_id in agent_ids {
            separated.push_bind(agent_id.0.clone());
        }
        query_builder.push(")");

        let rows = query_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        rows.iter().map(row_to_task).collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let (total_result, status_results, timestamp_result) = tokio::join!(
            sqlx::query("SELECT COUNT(*) as total FROM tasks").fetch_one(&self.pool),
            sqlx::query("SELECT status, COUNT(*) as count FROM tasks GROUP BY status").fetch_all(&self.pool),
            sqlx::query("SELECT MAX(created_at) as latest_created, MAX(completed_at) as latest_completed FROM tasks")
                .fetch_one(&self.pool),
        );

        let total_result = total_result.map_err(sqlx_error_to_orchestrator_error)?;
        let status_results = status_results.map_err(sqlx_error_to_orchestrator_error)?;
        let timestamp_result = timestamp_result.map_err(sqlx_error_to_orchestrator_error)?;

        let total_tasks: i64 = total_result.get("total");

        let mut tasks_by_status = HashMap::new();
        for row in status_results {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            tasks_by_status.insert(status, count as u64);
        }

        Ok(RepositoryStats {
            total_tasks: total_tasks as u64,
            tasks_by_status,
            latest_created: timestamp_result.get("latest_created"),
            latest_completed: timestamp_result.get("latest_completed"),
        })
    }
}

impl SqliteTaskRepository {
    async fn require(&self, id: &TaskId) -> Result<Task> {
        self.get(id).await?.ok_or_else(|| OrchestratorError::not_found_id(&id.0))
    }

    /// Writes an arbitrary orchestration log entry, for callers outside the
    /// repository's own transition points (e.g. the workflow engine and
    /// agent registry).
    pub async fn append_log(&self, entity_kind: &str, entity_id: &str, transition: &str, detail: Option<String>) -> Result<OrchestrationLogEntry> {
        self.log_transition(entity_kind, entity_id, transition, detail.as_deref()).await;
        Ok(OrchestrationLogEntry {
            id: 0,
            entity_kind: entity_kind.to_string(),
            entity_id: entity_id.to_string(),
            transition: transition.to_string(),
            detail,
            timestamp: Utc::now(),
        })
    }
}
