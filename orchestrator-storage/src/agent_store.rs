use orchestrator_core::{
    error::Result,
    models::{Agent, AgentId},
};
use sqlx::SqlitePool;

use crate::common::{agent_status_to_string, row_to_agent, sqlx_error_to_orchestrator_error};

/// Durable persistence for agent records, independent of the in-memory
/// [`orchestrator_core::agent_registry::AgentRegistry`].
///
/// The registry owns liveness and circuit-breaker state for the lifetime of
/// the orchestrator process; this store lets a fresh process rebuild the
/// roster (and each agent's lifetime counters) after a restart instead of
/// starting from zero.
#[derive(Debug, Clone)]
pub struct SqliteAgentStore {
    pool: SqlitePool,
}

impl SqliteAgentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the stored row for `agent`.
    pub async fn upsert(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, name, agent_type, repository_path, status, last_heartbeat,
                current_task_id, completed_count, failed_count, total_execution_time_ms
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                agent_type = excluded.agent_type,
                repository_path = excluded.repository_path,
                status = excluded.status,
                last_heartbeat = excluded.last_heartbeat,
                current_task_id = excluded.current_task_id,
                completed_count = excluded.completed_count,
                failed_count = excluded.failed_count,
                total_execution_time_ms = excluded.total_execution_time_ms
            "#,
        )
        .bind(&agent.id.0)
        .bind(&agent.name)
        .bind(&agent.agent_type)
        .bind(&agent.repository_path)
        .bind(agent_status_to_string(agent.status))
        .bind(agent.last_heartbeat)
        .bind(agent.current_task_id.as_ref().map(|t| t.0.clone()))
        .bind(agent.completed_count as i64)
        .bind(agent.failed_count as i64)
        .bind(agent.total_execution_time_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        Ok(())
    }

    /// Loads every persisted agent, for rebuilding the registry at startup.
    pub async fn load_all(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, name, agent_type, repository_path, status, last_heartbeat, \
             current_task_id, completed_count, failed_count, total_execution_time_ms FROM agents",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        rows.iter().map(row_to_agent).collect()
    }

    pub async fn remove(&self, id: &AgentId) -> Result<()> {
        sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;
        Ok(())
    }

    /// Opens a new session row for `agent_id`, returning its id.
    ///
    /// Called whenever an agent connects (on first registration and on every
    /// reconnect after going offline).
    pub async fn open_session(&self, agent_id: &AgentId) -> Result<i64> {
        let result = sqlx::query("INSERT INTO agent_sessions (agent_id, started_at) VALUES (?, ?)")
            .bind(&agent_id.0)
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;
        Ok(result.last_insert_rowid())
    }

    /// Closes the most recent open session for `agent_id`.
    pub async fn close_latest_session(&self, agent_id: &AgentId, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_sessions SET ended_at = ?, end_reason = ?
            WHERE id = (
                SELECT id FROM agent_sessions
                WHERE agent_id = ? AND ended_at IS NULL
                ORDER BY started_at DESC LIMIT 1
            )
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(reason)
        .bind(&agent_id.0)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;
        Ok(())
    }

    /// Agent ids with an open (not yet closed) session, used at startup to
    /// find agents whose last known state was "connected" before the
    /// previous process exited without a clean shutdown.
    pub async fn agents_with_open_sessions(&self) -> Result<Vec<AgentId>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT agent_id FROM agent_sessions WHERE ended_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        Ok(rows.into_iter().map(|(id,)| AgentId(id)).collect())
    }
}
