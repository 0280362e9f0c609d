//! Random test data generators using the `fake` and `proptest` crates.
//!
//! Provides realistic random data including:
//! - Repository paths and agent names from a realistic pool
//! - Random tasks/agents across lifecycle states
//! - Property-based testing strategies

use fake::faker::lorem::en::Word;
use fake::Fake;
use proptest::prelude::*;
use rand::Rng;

use crate::builders::{AgentBuilder, TaskBuilder};
use orchestrator_core::models::{Agent, AgentStatus, Task, TaskFilter, TaskStatus};

/// Generate a realistic repository path (e.g., "/repos/widgets-service").
pub fn generate_repository_path() -> String {
    let word: String = Word().fake();
    format!("/repos/{word}-service")
}

/// Generate a realistic agent name.
pub fn generate_agent_name() -> String {
    let pools = [
        "claude-worker", "rust-builder", "integration-runner", "release-agent", "review-bot", "migration-agent",
    ];
    let base = pools[rand::thread_rng().gen_range(0..pools.len())];
    let suffix: u32 = (1..99).fake();
    format!("{base}-{suffix}")
}

/// Generate a shell-looking command string for a task.
pub fn generate_command() -> String {
    let commands = ["cargo test", "cargo build --release", "npm run lint", "make deploy", "./scripts/migrate.sh"];
    commands[rand::thread_rng().gen_range(0..commands.len())].to_string()
}

/// Generate a random [`TaskStatus`].
pub fn generate_random_task_status() -> TaskStatus {
    let statuses = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];
    statuses[rand::thread_rng().gen_range(0..statuses.len())]
}

/// Generate a random [`AgentStatus`].
pub fn generate_random_agent_status() -> AgentStatus {
    let statuses = [AgentStatus::Idle, AgentStatus::Busy, AgentStatus::Offline, AgentStatus::Error];
    statuses[rand::thread_rng().gen_range(0..statuses.len())]
}

/// Generate a random task with realistic data.
pub fn generate_random_task() -> Task {
    TaskBuilder::new()
        .with_command(generate_command())
        .with_repository_path(generate_repository_path())
        .with_priority(rand::thread_rng().gen_range(0..10))
        .with_status(generate_random_task_status())
        .build()
}

/// Generate a random agent with realistic data.
pub fn generate_random_agent() -> Agent {
    AgentBuilder::new()
        .with_name(generate_agent_name())
        .with_repository_path(generate_repository_path())
        .with_status(generate_random_agent_status())
        .build()
}

/// Configurable task generator for bulk test data.
pub struct TaskGenerator {
    pub repository_pool: Vec<String>,
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self {
            repository_pool: vec!["/repos/repo-a".to_string(), "/repos/repo-b".to_string(), "/repos/repo-c".to_string()],
        }
    }

    pub fn generate(&self) -> Task {
        let path = &self.repository_pool[rand::thread_rng().gen_range(0..self.repository_pool.len())];
        TaskBuilder::new()
            .with_command(generate_command())
            .with_repository_path(path.clone())
            .with_priority(rand::thread_rng().gen_range(0..10))
            .with_status(generate_random_task_status())
            .build()
    }
}

/// Proptest strategy for generating valid repository paths.
pub fn repository_path_strategy() -> impl Strategy<Value = String> {
    "/repos/[a-z][a-z0-9-]{3,20}".prop_map(|s| s)
}

/// Proptest strategy for generating valid task priorities (`[0, 9]`).
pub fn priority_strategy() -> impl Strategy<Value = i32> {
    0i32..=9
}

/// Proptest strategy for generating task statuses.
pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::Assigned),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
        Just(TaskStatus::Failed),
        Just(TaskStatus::Cancelled),
    ]
}

/// Proptest strategy for generating complete tasks.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    ("[a-z ]{5,50}", repository_path_strategy(), priority_strategy(), task_status_strategy()).prop_map(
        |(command, repository_path, priority, status)| {
            TaskBuilder::new()
                .with_command(command)
                .with_repository_path(repository_path)
                .with_priority(priority)
                .with_status(status)
                .build()
        },
    )
}

/// Proptest strategy for generating task filters.
pub fn task_filter_strategy() -> impl Strategy<Value = TaskFilter> {
    (proptest::option::of(repository_path_strategy()), proptest::option::of(task_status_strategy())).prop_map(
        |(repository_path, status)| TaskFilter { repository_path, status, ..Default::default() },
    )
}
