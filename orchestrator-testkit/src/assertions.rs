//! Custom assertion helpers for testing.
//!
//! Provides specialized assertions for:
//! - Task equality with clear error messages
//! - State transition validation
//! - Collection-based assertions

use orchestrator_core::models::{Task, TaskId, TaskStatus};

/// Assert tasks are equal ignoring timestamps and execution counters.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "task ids don't match");
    assert_eq!(actual.command, expected.command, "task commands don't match");
    assert_eq!(actual.repository_path, expected.repository_path, "task repository paths don't match");
    assert_eq!(actual.status, expected.status, "task statuses don't match");
    assert_eq!(actual.agent_id, expected.agent_id, "task agent ids don't match");
}

/// Assert tasks are equal in every field, including timestamps.
pub fn assert_task_equals_exact(actual: &Task, expected: &Task) {
    assert_eq!(actual, expected, "tasks are not exactly equal");
}

/// Assert a task matches partial criteria.
pub fn assert_task_matches(task: &Task, matcher: &TaskMatcher) {
    if let Some(ref expected_id) = matcher.id {
        assert_eq!(task.id, *expected_id, "task id doesn't match expected");
    }
    if let Some(ref expected_path) = matcher.repository_path {
        assert_eq!(task.repository_path, *expected_path, "task repository path doesn't match expected");
    }
    if let Some(expected_status) = matcher.status {
        assert_eq!(task.status, expected_status, "task status doesn't match expected");
    }
    if let Some(ref expected_agent) = matcher.agent_id {
        assert_eq!(task.agent_id, *expected_agent, "task agent id doesn't match expected");
    }
}

/// Assert a transition from `from` to `to` is valid per [`TaskStatus::can_transition_to`].
pub fn assert_state_transition_valid(from: TaskStatus, to: TaskStatus) {
    assert!(
        from.can_transition_to(to),
        "expected transition from {from} to {to} to be valid, but it's not"
    );
}

/// Assert a transition from `from` to `to` is rejected.
pub fn assert_state_transition_invalid(from: TaskStatus, to: TaskStatus) {
    assert!(
        !from.can_transition_to(to),
        "expected transition from {from} to {to} to be invalid, but it's valid"
    );
}

/// Assert a task list contains a task bound to `repository_path`.
pub fn assert_contains_task_for_repository(tasks: &[Task], repository_path: &str) {
    assert!(
        tasks.iter().any(|t| t.repository_path == repository_path),
        "expected to find a task for repository '{repository_path}', but none matched. available paths: {:?}",
        tasks.iter().map(|t| &t.repository_path).collect::<Vec<_>>()
    );
}

/// Assert tasks are sorted by creation date, most recent first.
pub fn assert_tasks_sorted_by_created_at_desc(tasks: &[Task]) {
    for window in tasks.windows(2) {
        assert!(
            window[0].created_at >= window[1].created_at,
            "tasks are not sorted by created_at descending: '{}' ({}) comes before '{}' ({})",
            window[0].id,
            window[0].created_at,
            window[1].id,
            window[1].created_at
        );
    }
}

/// Flexible task matcher for partial assertions.
#[derive(Debug, Default)]
pub struct TaskMatcher {
    pub id: Option<TaskId>,
    pub repository_path: Option<String>,
    pub status: Option<TaskStatus>,
    pub agent_id: Option<Option<orchestrator_core::models::AgentId>>,
}

impl TaskMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_repository_path(mut self, path: impl Into<String>) -> Self {
        self.repository_path = Some(path.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<orchestrator_core::models::AgentId>) -> Self {
        self.agent_id = Some(Some(agent_id.into()));
        self
    }
}
