//! Orchestrator Core Library
//!
//! Foundational domain models, state machines, and trait interfaces for the
//! task dispatch core and workflow engine. All other crates in the workspace
//! depend on the types and traits defined here; none of them depend on each
//! other.
//!
//! # Architecture
//!
//! - [`models`] - domain types: `Task`, `Agent`, `WorkflowDefinition`, and their state machines
//! - [`error`] - the crate-wide error type and `Result` alias
//! - [`repository`] - `TaskRepository`, the durable store's contract
//! - [`validation`] - enqueue validation and workflow DAG validation
//! - [`circuit_breaker`] - per-agent failure tracking and quarantine
//! - [`agent_registry`] - agent liveness, availability, and idle-agent selection
//! - [`dispatcher`] - matches pending tasks to idle agents, plus cancellation
//! - [`evaluator`] - the `{{var}}` substitution and boolean condition grammar
//! - [`retry`] - bounded retry with exponential backoff for a single step
//! - [`loop_executor`] - `ForEach`/`While`/`Retry` loop headers
//! - [`workflow_engine`] - validates, plans, and drives workflow executions
//! - [`workflow_document`] - the schema produced by a markdown-originated
//!   workflow document, and its translation into a `WorkflowDefinition`
//!
//! # Example
//!
//! ```rust
//! use orchestrator_core::{
//!     models::NewTask,
//!     validation::TaskValidator,
//! };
//!
//! let new_task = NewTask {
//!     command: "cargo test".to_string(),
//!     repository_path: "/repos/widgets".to_string(),
//!     priority: 5,
//!     correlation_id: None,
//!     workflow_id: None,
//!     parent_task_id: None,
//!     workflow_step_index: None,
//! };
//!
//! TaskValidator::validate_new_task(&new_task).unwrap();
//! ```

pub mod agent_registry;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod loop_executor;
pub mod models;
pub mod repository;
pub mod retry;
pub mod validation;
pub mod workflow_document;
pub mod workflow_engine;

pub use agent_registry::{AgentRegistry, InMemoryAgentRegistry, SharedAgentRegistry};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerAction, CircuitState, FailureType};
pub use dispatcher::{AgentContext, AgentExecutor, CancellationToken, Dispatcher, ExecutionOutcome};
pub use error::{OrchestratorError, Result};
pub use evaluator::ExpressionEvaluator;
pub use loop_executor::{IterationResult, LoopExecutor, LoopOutcome};
pub use models::{
    Agent, AgentId, AgentStatus, LoopDefinition, LoopType, NewTask, OrchestrationLogEntry,
    RetryPolicy, StepResult, StepStatus, StepType, Task, TaskFilter, TaskId, TaskStatus,
    VariableDefinition, VariableType, WorkflowContext, WorkflowDefinition,
    WorkflowExecutionResult, WorkflowMetadata, WorkflowStatus, WorkflowStep,
};
pub use repository::{RepositoryStats, TaskRepository};
pub use retry::{Attempt, RetryExecutor, RetryOutcome};
pub use validation::{TaskValidator, WorkflowValidator};
pub use workflow_document::{
    DocumentSection, DocumentStep, DocumentVariable, MarkdownWorkflowDocument, translate,
};
pub use workflow_engine::{StepRunner, WorkflowEngine};

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_constants_are_populated() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "orchestrator-core");
    }

    #[test]
    fn re_exports_resolve() {
        let status = TaskStatus::Pending;
        assert_eq!(format!("{status}"), "Pending");

        let error = OrchestratorError::not_found_id("t-1");
        assert!(error.is_not_found());
    }
}
