use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque agent identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A unit of work dispatched against a repository working directory.
///
/// See the task lifecycle invariants on [`TaskStatus`]: a task in
/// `Assigned`/`InProgress` always carries a non-null `agent_id`, and
/// `started_at <= completed_at` whenever both are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    pub repository_path: String,
    /// Higher runs sooner. Valid range is `[0, 9]`.
    pub priority: i32,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_duration_ms: Option<i64>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub correlation_id: Option<String>,
    pub workflow_id: Option<String>,
    pub parent_task_id: Option<TaskId>,
    pub workflow_step_index: Option<i32>,
    pub agent_id: Option<AgentId>,
}

/// Task lifecycle states.
///
/// Transitions obey the DAG `Pending -> {Assigned -> InProgress ->
/// {Completed|Failed}} union {Cancelled from any non-terminal state}`.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a task in this state may move to `target`.
    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, target) {
            (current, new) if current == new => false,
            (_, Cancelled) => !self.is_terminal(),
            (Pending, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl Task {
    /// Create a task fresh off `Enqueue`, with `status = Pending`.
    pub fn new_pending(command: String, repository_path: String, priority: i32) -> Self {
        Self {
            id: TaskId::new(),
            command,
            repository_path,
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_duration_ms: None,
            result: None,
            error: None,
            retry_count: 0,
            correlation_id: None,
            workflow_id: None,
            parent_task_id: None,
            workflow_step_index: None,
            agent_id: None,
        }
    }

    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.status.can_transition_to(target)
    }
}

/// Inputs accepted by `Enqueue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub command: String,
    pub repository_path: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub correlation_id: Option<String>,
    pub workflow_id: Option<String>,
    pub parent_task_id: Option<TaskId>,
    pub workflow_step_index: Option<i32>,
}

fn default_priority() -> i32 {
    5
}

/// Filter criteria for `List`. Fields combine with AND logic; all are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub repository_path: Option<String>,
    pub agent_id: Option<AgentId>,
    pub workflow_id: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Long-lived worker process bound to a single repository path.
///
/// `status = Busy` iff `current_task_id` is set and that task has status
/// in `{Assigned, InProgress}` with `agent_id` equal to this agent's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub agent_type: String,
    pub repository_path: String,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub current_task_id: Option<TaskId>,
    pub completed_count: u64,
    pub failed_count: u64,
    pub total_execution_time_ms: u64,
}

impl Agent {
    pub fn new(name: String, agent_type: String, repository_path: String) -> Self {
        Self {
            id: AgentId::new(),
            name,
            agent_type,
            repository_path,
            status: AgentStatus::Idle,
            last_heartbeat: Utc::now(),
            current_task_id: None,
            completed_count: 0,
            failed_count: 0,
            total_execution_time_ms: 0,
        }
    }

    /// Rolling average execution time across completed and failed tasks.
    pub fn average_execution_time_ms(&self) -> f64 {
        let attempts = self.completed_count + self.failed_count;
        if attempts == 0 {
            0.0
        } else {
            self.total_execution_time_ms as f64 / attempts as f64
        }
    }
}

/// Agent liveness/availability state. See the registry state machine in the
/// agent registry component design for the full transition diagram.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Busy => "Busy",
            Self::Offline => "Offline",
            Self::Error => "Error",
        };
        write!(f, "{s}")
    }
}

/// A durable record of one state transition, for the orchestration log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestrationLogEntry {
    pub id: i64,
    pub entity_kind: String,
    pub entity_id: String,
    pub transition: String,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Workflow data model
// ---------------------------------------------------------------------

/// A validated, ordered collection of steps forming a DAG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub variables: HashMap<String, VariableDefinition>,
    pub metadata: WorkflowMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowMetadata {
    pub author: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A single node in the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub id: String,
    pub step_type: StepType,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub condition: Option<String>,
    pub retry_policy: Option<RetryPolicy>,
    pub loop_def: Option<LoopDefinition>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            step_type,
            command: String::new(),
            parameters: HashMap::new(),
            depends_on: Vec::new(),
            condition: None,
            retry_policy: None,
            loop_def: None,
        }
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_loop_def(mut self, loop_def: LoopDefinition) -> Self {
        self.loop_def = Some(loop_def);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// `Parallel` is treated as `Task` by the core engine unless a fan-out
/// extension is added. `Delay` and `SubWorkflow` are produced by
/// [`crate::workflow_document::translate`] from a markdown-originated
/// document but are not executed by the engine itself; a caller wanting
/// those semantics maps them onto `Task`/`Loop` steps before submission.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Task,
    Condition,
    Loop,
    Parallel,
    Delay,
    SubWorkflow,
    Start,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub var_type: VariableType,
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

/// Variable type tags, matching the schema produced by
/// [`crate::workflow_document::translate`].
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    DateTime,
    FilePath,
    Url,
    Json,
    StringArray,
}

/// Bounded retry behavior applied by the retry executor to a single step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_retry_count: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub retryable_exceptions: Vec<String>,
    pub retry_condition: Option<String>,
}

impl RetryPolicy {
    /// A policy that attempts the operation exactly once.
    pub fn single_attempt() -> Self {
        Self {
            max_retry_count: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            retryable_exceptions: Vec::new(),
            retry_condition: None,
        }
    }

    /// Delay before attempt `n` (first retry is `n = 1`).
    pub fn delay_for_attempt(&self, n: u32) -> u64 {
        let scaled = self.base_delay_ms as f64 * self.backoff_multiplier.powi(n as i32 - 1);
        let scaled = if scaled.is_finite() { scaled } else { self.max_delay_ms as f64 };
        (scaled as u64).min(self.max_delay_ms.max(self.base_delay_ms))
    }
}

/// Loop header evaluated by the loop executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopDefinition {
    pub loop_type: LoopType,
    pub collection: Option<String>,
    pub condition: Option<String>,
    #[serde(default = "default_iterator_variable")]
    pub iterator_variable: String,
    #[serde(default = "default_index_variable")]
    pub index_variable: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_iterator_variable() -> String {
    "item".to_string()
}

fn default_index_variable() -> String {
    "index".to_string()
}

fn default_max_iterations() -> u32 {
    1000
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    ForEach,
    While,
    Retry,
}

/// Live execution state for one running/paused/completed workflow.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub execution_id: String,
    pub variables: HashMap<String, Value>,
    pub cancellation: crate::dispatcher::CancellationToken,
}

impl WorkflowContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            execution_id,
            variables: HashMap::new(),
            cancellation: crate::dispatcher::CancellationToken::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

/// Overall status of one workflow execution.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Valid transitions per the execution state machine.
    pub fn can_transition_to(self, target: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// Status of one attempted workflow step within an execution result.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Record of one executed (or skipped) step in a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub skipped: bool,
    pub reason: Option<String>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub total_attempts: u32,
    #[serde(default)]
    pub all_attempts_failed: bool,
    /// Per-attempt detail (success flag, exception, execution time,
    /// scheduled next delay) for steps that went through the retry
    /// executor. Empty for steps that never retried (loop bodies, skipped
    /// steps, Start/End markers).
    #[serde(default)]
    pub attempts: Vec<crate::retry::Attempt>,
    pub executed_at: DateTime<Utc>,
}

/// The terminal or paused result of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecutionResult {
    pub execution_id: String,
    pub status: WorkflowStatus,
    pub output: HashMap<String, Value>,
    pub step_results: Vec<StepResult>,
    pub error: Option<String>,
}

impl WorkflowExecutionResult {
    pub fn pending(execution_id: String) -> Self {
        Self {
            execution_id,
            status: WorkflowStatus::Pending,
            output: HashMap::new(),
            step_results: Vec::new(),
            error: None,
        }
    }
}
