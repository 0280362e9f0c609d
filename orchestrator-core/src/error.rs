use thiserror::Error;

use crate::models::TaskStatus;

/// Result type alias used throughout the orchestrator core.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Error kinds surfaced by the task dispatch core and the workflow engine.
///
/// These map to the error kinds named in the orchestrator's error handling
/// design: caller-visible precondition failures are never retried, state
/// machine violations are never swallowed, and storage errors propagate
/// unchanged so the caller decides whether to retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// A caller-visible precondition failed (empty repo path, out-of-range priority, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No task/agent/execution exists with the given identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state machine transition was attempted that the DAG does not allow.
    #[error("illegal transition from {0} to {1}")]
    IllegalTransition(String, String),

    /// A task in {Assigned, InProgress} was found to have no agent id, or similar invariant breach.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Workflow validation failed (duplicate step ids, unresolved dependency, cycle, ...).
    #[error("workflow validation failed: {0}")]
    ValidationFailed(String),

    /// A required variable was not supplied at workflow execution start.
    #[error("required variable missing: {0}")]
    RequiredVariableMissing(String),

    /// A step's prerequisite failed or never executed.
    #[error("dependency blocked: step {0} did not run because {1} did not complete")]
    DependencyBlocked(String, String),

    /// The step delegate raised after exhausting its retry policy.
    #[error("step execution failed: {0}")]
    StepExecutionFailed(String),

    /// The workflow execution's cancellation signal fired.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The underlying store's I/O failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A task is already claimed by another agent.
    #[error("task {0} is already claimed by agent {1}")]
    AlreadyClaimed(String, String),

    /// A boolean/substitution expression failed to parse or evaluate.
    #[error("expression error: {0}")]
    Expression(String),
}

impl OrchestratorError {
    pub fn invalid_transition(from: TaskStatus, to: TaskStatus) -> Self {
        Self::IllegalTransition(from.to_string(), to.to_string())
    }

    pub fn not_found_id(id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("task {id} not found"))
    }

    pub fn empty_field(field: &str) -> Self {
        Self::InvalidArgument(format!("field '{field}' cannot be empty"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Convenience status-code mapping for callers translating these into a
    /// transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidArgument(_) => 400,
            Self::IllegalTransition(_, _) => 422,
            Self::InvariantViolation(_) => 500,
            Self::ValidationFailed(_) => 422,
            Self::RequiredVariableMissing(_) => 400,
            Self::DependencyBlocked(_, _) => 424,
            Self::StepExecutionFailed(_) => 500,
            Self::Cancelled(_) => 499,
            Self::Storage(_) => 500,
            Self::AlreadyClaimed(_, _) => 409,
            Self::Expression(_) => 400,
        }
    }
}
