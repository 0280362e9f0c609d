//! Standard test fixtures for consistent testing.
//!
//! Provides pre-built test data including:
//! - Standard tasks/agents in various states
//! - Bulk generators for listing/filtering tests
//! - Simple workflow definitions

use chrono::Utc;
use orchestrator_core::models::{
    Agent, AgentStatus, NewTask, StepType, Task, TaskStatus, WorkflowDefinition,
};

use crate::builders::{AgentBuilder, NewTaskBuilder, TaskBuilder, WorkflowDefinitionBuilder, WorkflowStepBuilder};

/// A pending task with default command and repository.
pub fn create_test_task() -> Task {
    TaskBuilder::new().build()
}

/// A task pinned to a specific status.
pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    TaskBuilder::new().with_status(status).build()
}

/// A task bound to `repository_path`.
pub fn create_test_task_for_repository(repository_path: &str) -> Task {
    TaskBuilder::new().with_repository_path(repository_path).build()
}

/// `count` tasks spread across repositories, priorities and statuses, for
/// listing/filtering tests.
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    let statuses = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    (0..count)
        .map(|i| {
            TaskBuilder::new()
                .with_command(format!("task-{i}"))
                .with_repository_path(format!("/repos/repo-{}", i % 3))
                .with_priority((i % 10) as i32)
                .with_status(statuses[i % statuses.len()])
                .build()
        })
        .collect()
}

/// One task in every lifecycle status.
pub fn create_tasks_in_all_states() -> Vec<Task> {
    vec![
        TaskBuilder::new().with_status(TaskStatus::Pending).build(),
        TaskBuilder::new().with_status(TaskStatus::Assigned).build(),
        TaskBuilder::new().with_status(TaskStatus::InProgress).build(),
        TaskBuilder::new().with_status(TaskStatus::Completed).build(),
        TaskBuilder::new().with_status(TaskStatus::Failed).build(),
        TaskBuilder::new().with_status(TaskStatus::Cancelled).build(),
    ]
}

/// A standard `NewTask` for testing `enqueue`.
pub fn create_new_task() -> NewTask {
    NewTaskBuilder::new().build()
}

/// `NewTask` bound to a specific repository path.
pub fn create_new_task_for_repository(repository_path: &str) -> NewTask {
    NewTaskBuilder::new().with_repository_path(repository_path).build()
}

/// An idle agent bound to `/repos/widgets`.
pub fn create_test_agent() -> Agent {
    AgentBuilder::new().build()
}

/// An agent pinned to a specific status.
pub fn create_test_agent_with_status(status: AgentStatus) -> Agent {
    AgentBuilder::new().with_status(status).build()
}

/// An agent whose heartbeat is `age` old, for staleness/reaper tests.
pub fn create_stale_agent(age: chrono::Duration) -> Agent {
    AgentBuilder::new()
        .with_status(AgentStatus::Offline)
        .with_last_heartbeat(Utc::now() - age)
        .build()
}

/// A two-step linear workflow: `start -> build -> end`, with `build`
/// depending on `start`.
pub fn create_linear_workflow(id: &str) -> WorkflowDefinition {
    WorkflowDefinitionBuilder::new(id, "linear-demo")
        .with_step(WorkflowStepBuilder::new("start").with_type(StepType::Start).build())
        .with_step(
            WorkflowStepBuilder::new("build")
                .with_command("cargo build")
                .with_depends_on(["start"])
                .build(),
        )
        .with_step(
            WorkflowStepBuilder::new("end")
                .with_type(StepType::End)
                .with_depends_on(["build"])
                .build(),
        )
        .build()
}
