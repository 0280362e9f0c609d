use orchestrator_core::{error::Result, models::WorkflowDefinition};
use sqlx::{Row, SqlitePool};

use crate::common::sqlx_error_to_orchestrator_error;

/// Durable storage for submitted workflow documents, independent of the
/// engine's in-memory execution state.
///
/// A workflow definition is submitted once and may be started many times;
/// persisting it here means a restart doesn't lose the document even though
/// in-flight executions are not themselves recoverable (see DESIGN.md).
#[derive(Debug, Clone)]
pub struct SqliteWorkflowDefinitionStore {
    pool: SqlitePool,
}

impl SqliteWorkflowDefinitionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, definition: &WorkflowDefinition) -> Result<()> {
        let json = serde_json::to_string(definition)
            .map_err(|e| orchestrator_core::error::OrchestratorError::Storage(format!("failed to serialize workflow definition: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (id, definition_json, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET definition_json = excluded.definition_json
            "#,
        )
        .bind(&definition.id)
        .bind(json)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(sqlx_error_to_orchestrator_error)?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query("SELECT definition_json FROM workflow_definitions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;

        match row {
            None => Ok(None),
            Some(row) => {
                let json: String = row.get("definition_json");
                let definition = serde_json::from_str(&json).map_err(|e| {
                    orchestrator_core::error::OrchestratorError::Storage(format!("corrupt workflow definition row: {e}"))
                })?;
                Ok(Some(definition))
            }
        }
    }

    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM workflow_definitions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_orchestrator_error)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::models::{StepType, WorkflowDefinition, WorkflowMetadata, WorkflowStep};
    use std::collections::HashMap;

    async fn test_pool() -> SqlitePool {
        let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let url = format!("sqlite::memory:workflow_store_{timestamp}");
        let options = sqlx::sqlite::SqliteConnectOptions::new().filename(&url).create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        sqlx::migrate!("./migrations/sqlite").run(&pool).await.unwrap();
        pool
    }

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-deploy".to_string(),
            name: "deploy".to_string(),
            steps: vec![WorkflowStep::new("start", StepType::Start)],
            variables: HashMap::new(),
            metadata: WorkflowMetadata {
                version: Some("1.0.0".to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = SqliteWorkflowDefinitionStore::new(test_pool().await);
        let definition = sample_definition();
        store.save(&definition).await.unwrap();

        let loaded = store.get(&definition.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, definition.id);
        assert_eq!(loaded.steps.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = SqliteWorkflowDefinitionStore::new(test_pool().await);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_definition() {
        let store = SqliteWorkflowDefinitionStore::new(test_pool().await);
        let mut definition = sample_definition();
        store.save(&definition).await.unwrap();

        definition.metadata.version = Some("2.0.0".to_string());
        store.save(&definition).await.unwrap();

        let loaded = store.get(&definition.id).await.unwrap().unwrap();
        assert_eq!(loaded.metadata.version.as_deref(), Some("2.0.0"));
        assert_eq!(store.list_ids().await.unwrap().len(), 1);
    }
}
