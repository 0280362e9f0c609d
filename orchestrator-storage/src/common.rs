use chrono::{DateTime, Utc};
use orchestrator_core::{
    error::{OrchestratorError, Result},
    models::{Agent, AgentId, AgentStatus, Task, TaskFilter, TaskId, TaskStatus},
};
use sqlx::{sqlite::SqliteRow, Row};

/// Convert [`TaskStatus`] to its stored string form.
pub fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Assigned => "assigned",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

/// Convert a stored status string back to [`TaskStatus`].
pub fn string_to_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "assigned" => Ok(TaskStatus::Assigned),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(OrchestratorError::Storage(format!("invalid task status in database: {other}"))),
    }
}

pub fn agent_status_to_string(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "idle",
        AgentStatus::Busy => "busy",
        AgentStatus::Offline => "offline",
        AgentStatus::Error => "error",
    }
}

pub fn string_to_agent_status(s: &str) -> Result<AgentStatus> {
    match s {
        "idle" => Ok(AgentStatus::Idle),
        "busy" => Ok(AgentStatus::Busy),
        "offline" => Ok(AgentStatus::Offline),
        "error" => Ok(AgentStatus::Error),
        other => Err(OrchestratorError::Storage(format!("invalid agent status in database: {other}"))),
    }
}

/// Convert a SQLite row from the `tasks` table to a [`Task`].
pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let status = string_to_status(&status_str)?;

    let id: String = row.get("id");
    let agent_id: Option<String> = row.try_get("agent_id").ok().flatten();
    let parent_task_id: Option<String> = row.try_get("parent_task_id").ok().flatten();

    Ok(Task {
        id: TaskId(id),
        command: row.get("command"),
        repository_path: row.get("repository_path"),
        priority: row.get("priority"),
        status,
        created_at: row.get("created_at"),
        started_at: row.try_get("started_at").ok().flatten(),
        completed_at: row.try_get("completed_at").ok().flatten(),
        execution_duration_ms: row.try_get("execution_duration_ms").ok().flatten(),
        result: row.try_get("result").ok().flatten(),
        error: row.try_get("error").ok().flatten(),
        retry_count: row.get("retry_count"),
        correlation_id: row.try_get("correlation_id").ok().flatten(),
        workflow_id: row.try_get("workflow_id").ok().flatten(),
        parent_task_id: parent_task_id.map(TaskId),
        workflow_step_index: row.try_get("workflow_step_index").ok().flatten(),
        agent_id: agent_id.map(AgentId),
    })
}

/// Convert a SQLite row from the `agents` table to an [`Agent`].
pub fn row_to_agent(row: &SqliteRow) -> Result<Agent> {
    let status_str: String = row.get("status");
    let status = string_to_agent_status(&status_str)?;
    let id: String = row.get("id");
    let current_task_id: Option<String> = row.try_get("current_task_id").ok().flatten();

    Ok(Agent {
        id: AgentId(id),
        name: row.get("name"),
        agent_type: row.get("agent_type"),
        repository_path: row.get("repository_path"),
        status,
        last_heartbeat: row.get("last_heartbeat"),
        current_task_id: current_task_id.map(TaskId),
        completed_count: row.get::<i64, _>("completed_count") as u64,
        failed_count: row.get::<i64, _>("failed_count") as u64,
        total_execution_time_ms: row.get::<i64, _>("total_execution_time_ms") as u64,
    })
}

/// Map an `sqlx::Error` onto the crate-wide error type.
pub fn sqlx_error_to_orchestrator_error(err: sqlx::Error) -> OrchestratorError {
    match &err {
        sqlx::Error::RowNotFound => OrchestratorError::NotFound("row not found".to_string()),
        sqlx::Error::PoolTimedOut => OrchestratorError::Storage("connection pool timeout".to_string()),
        sqlx::Error::Io(io_err) => OrchestratorError::Storage(format!("database I/O error: {io_err}")),
        sqlx::Error::Database(db_err) => {
            OrchestratorError::Storage(format!("database constraint error: {}", db_err.message()))
        }
        _ => OrchestratorError::Storage(format!("database operation failed: {err}")),
    }
}

/// Build the dynamic `WHERE` clause for `List`, binding every predicate
/// through `QueryBuilder` rather than string interpolation.
pub fn build_filter_query(filter: &TaskFilter) -> sqlx::QueryBuilder<'_, sqlx::Sqlite> {
    let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
        "SELECT id, command, repository_path, priority, status, created_at, started_at, \
         completed_at, execution_duration_ms, result, error, retry_count, correlation_id, \
         workflow_id, parent_task_id, workflow_step_index, agent_id FROM tasks",
    );

    let mut has_conditions = false;
    macro_rules! clause {
        ($sql:expr) => {
            if has_conditions {
                query_builder.push(" AND ");
            } else {
                query_builder.push(" WHERE ");
                has_conditions = true;
            }
            query_builder.push($sql);
        };
    }

    if let Some(status) = filter.status {
        clause!("status = ");
        query_builder.push_bind(status_to_string(status));
    }
    if let Some(repo) = &filter.repository_path {
        clause!("repository_path = ");
        query_builder.push_bind(repo.clone());
    }
    if let Some(agent_id) = &filter.agent_id {
        clause!("agent_id = ");
        query_builder.push_bind(agent_id.0.clone());
    }
    if let Some(workflow_id) = &filter.workflow_id {
        clause!("workflow_id = ");
        query_builder.push_bind(workflow_id.clone());
    }
    if let Some(from) = filter.created_from {
        clause!("created_at >= ");
        query_builder.push_bind(from);
    }
    if let Some(to) = filter.created_to {
        clause!("created_at <= ");
        query_builder.push_bind(to);
    }

    query_builder.push(" ORDER BY created_at DESC");

    if let Some(limit) = filter.limit {
        query_builder.push(" LIMIT ");
        query_builder.push_bind(limit);
    }
    if let Some(offset) = filter.offset {
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);
    }

    query_builder
}
