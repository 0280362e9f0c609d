//! Fluent builders for constructing test data.
//!
//! Provides builders for:
//! - Task and NewTask construction with sensible defaults
//! - Agent construction
//! - Workflow step and definition construction
//! - Filter construction for query testing

use chrono::{DateTime, Utc};
use orchestrator_core::models::{
    Agent, AgentId, AgentStatus, NewTask, RetryPolicy, StepType, Task, TaskFilter, TaskId, TaskStatus,
    WorkflowDefinition, WorkflowMetadata, WorkflowStep,
};

/// Builder for constructing [`Task`] instances in tests.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new_pending("echo hello".to_string(), "/repos/widgets".to_string(), 5),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.task.id = id.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.task.command = command.into();
        self
    }

    pub fn with_repository_path(mut self, path: impl Into<String>) -> Self {
        self.task.repository_path = path.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    /// Sets the status directly, bypassing the state machine, and fills in
    /// `started_at`/`completed_at` if the target status implies them.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        match status {
            TaskStatus::Assigned | TaskStatus::InProgress if self.task.started_at.is_none() => {
                self.task.started_at = Some(Utc::now());
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled if self.task.completed_at.is_none() => {
                self.task.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.task.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_retry_count(mut self, count: i32) -> Self {
        self.task.retry_count = count;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.task.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>, step_index: i32) -> Self {
        self.task.workflow_id = Some(workflow_id.into());
        self.task.workflow_step_index = Some(step_index);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for constructing [`NewTask`] instances in tests.
pub struct NewTaskBuilder {
    new_task: NewTask,
}

impl Default for NewTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NewTaskBuilder {
    pub fn new() -> Self {
        Self {
            new_task: NewTask {
                command: "echo hello".to_string(),
                repository_path: "/repos/widgets".to_string(),
                priority: 5,
                correlation_id: None,
                workflow_id: None,
                parent_task_id: None,
                workflow_step_index: None,
            },
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.new_task.command = command.into();
        self
    }

    pub fn with_repository_path(mut self, path: impl Into<String>) -> Self {
        self.new_task.repository_path = path.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.new_task.priority = priority;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.new_task.correlation_id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, workflow_id: impl Into<String>, parent_task_id: impl Into<TaskId>, step_index: i32) -> Self {
        self.new_task.workflow_id = Some(workflow_id.into());
        self.new_task.parent_task_id = Some(parent_task_id.into());
        self.new_task.workflow_step_index = Some(step_index);
        self
    }

    pub fn build(self) -> NewTask {
        self.new_task
    }
}

/// Builder for constructing [`Agent`] instances in tests.
pub struct AgentBuilder {
    agent: Agent,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            agent: Agent::new("test-agent".to_string(), "claude-code".to_string(), "/repos/widgets".to_string()),
        }
    }

    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.agent.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.agent.name = name.into();
        self
    }

    pub fn with_repository_path(mut self, path: impl Into<String>) -> Self {
        self.agent.repository_path = path.into();
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.agent.status = status;
        self
    }

    pub fn with_current_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.agent.current_task_id = Some(task_id.into());
        self
    }

    pub fn with_last_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.agent.last_heartbeat = at;
        self
    }

    pub fn with_counts(mut self, completed: u64, failed: u64) -> Self {
        self.agent.completed_count = completed;
        self.agent.failed_count = failed;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

/// Builder for constructing [`WorkflowStep`] instances in tests.
pub struct WorkflowStepBuilder {
    step: WorkflowStep,
}

impl WorkflowStepBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self { step: WorkflowStep::new(id, StepType::Task) }
    }

    pub fn with_type(mut self, step_type: StepType) -> Self {
        self.step.step_type = step_type;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.step.command = command.into();
        self
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.step.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.step.condition = Some(condition.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.step.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> WorkflowStep {
        self.step
    }
}

/// Builder for constructing [`WorkflowDefinition`] instances in tests.
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            definition: WorkflowDefinition {
                id: id.into(),
                name: name.into(),
                steps: Vec::new(),
                variables: std::collections::HashMap::new(),
                metadata: WorkflowMetadata::default(),
            },
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.definition.steps.push(step);
        self
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = WorkflowStep>) -> Self {
        self.definition.steps.extend(steps);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.definition.metadata.version = Some(version.into());
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}

/// Builder for constructing [`TaskFilter`] instances in tests.
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl Default for TaskFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilterBuilder {
    pub fn new() -> Self {
        Self { filter: TaskFilter::default() }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.filter.status = Some(status);
        self
    }

    pub fn with_repository_path(mut self, path: impl Into<String>) -> Self {
        self.filter.repository_path = Some(path.into());
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.filter.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.filter.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_date_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.filter.created_from = Some(from);
        self.filter.created_to = Some(to);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.filter.offset = Some(offset);
        self
    }

    pub fn build(self) -> TaskFilter {
        self.filter
    }
}
