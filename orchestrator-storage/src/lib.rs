//! SQLite persistence for the orchestrator.
//!
//! This crate provides the durable [`TaskRepository`] implementation backing
//! the task dispatch core, plus a companion store for agent roster recovery
//! and an orchestration log for auditing every state transition.
//!
//! # Features
//!
//! - SQLite with WAL journaling for file-backed databases
//! - Schema migrations via `sqlx::migrate!`
//! - Connection pooling
//! - Dynamic, parameterized filter queries via `QueryBuilder`
//!
//! # Usage
//!
//! ```rust,no_run
//! use orchestrator_storage::{SqliteTaskRepository, TaskRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = SqliteTaskRepository::new(":memory:").await?;
//!     repo.migrate().await?;
//!     repo.health_check().await?;
//!     Ok(())
//! }
//! ```

mod agent_store;
mod common;
mod sqlite;
mod workflow_store;

pub use agent_store::SqliteAgentStore;
pub use common::{
    agent_status_to_string, row_to_agent, row_to_task, status_to_string, string_to_agent_status,
    string_to_status,
};
pub use sqlite::SqliteTaskRepository;
pub use workflow_store::SqliteWorkflowDefinitionStore;

pub use orchestrator_core::{
    error::{OrchestratorError, Result},
    models::{Agent, AgentId, AgentStatus, NewTask, Task, TaskFilter, TaskId, TaskStatus, WorkflowDefinition},
    repository::{RepositoryStats, TaskRepository},
};
