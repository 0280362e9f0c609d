//! In-memory [`TaskRepository`] for unit tests that don't need SQLite.
//!
//! Provides error injection and call-history tracking so callers can assert
//! on exactly how the dispatcher and workflow engine used the repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::{
    error::{OrchestratorError, Result},
    models::{AgentId, NewTask, Task, TaskFilter, TaskId, TaskStatus},
    repository::{RepositoryStats, TaskRepository},
    validation::TaskValidator,
};
use parking_lot::Mutex;

pub struct MockTaskRepository {
    tasks: Mutex<HashMap<TaskId, Task>>,
    sequence: AtomicU64,
    error_injection: Mutex<Option<OrchestratorError>>,
    call_history: Mutex<Vec<String>>,
}

impl Default for MockTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let repo = Self::new();
        let mut map = repo.tasks.lock();
        for task in tasks {
            map.insert(task.id.clone(), task);
        }
        drop(map);
        repo
    }

    /// Makes the next call fail with `error`, then clears itself.
    pub fn inject_error(&self, error: OrchestratorError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|call| call.starts_with(method)),
            "method '{method}' was not called; history: {history:?}"
        );
    }

    fn take_injected_error(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }

    fn record(&self, call: impl Into<String>) {
        self.call_history.lock().push(call.into());
    }

    fn next_id(&self) -> TaskId {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        TaskId(format!("mock-task-{n}"))
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn enqueue(&self, task: NewTask) -> Result<Task> {
        self.record(format!("enqueue({})", task.command));
        self.take_injected_error()?;
        TaskValidator::validate_new_task(&task)?;

        let id = self.next_id();
        let created = Task {
            id: id.clone(),
            command: task.command,
            repository_path: task.repository_path,
            priority: task.priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            execution_duration_ms: None,
            result: None,
            error: None,
            retry_count: 0,
            correlation_id: task.correlation_id,
            workflow_id: task.workflow_id,
            parent_task_id: task.parent_task_id,
            workflow_step_index: task.workflow_step_index,
            agent_id: None,
        };

        self.tasks.lock().insert(id, created.clone());
        Ok(created)
    }

    async fn claim_next_for(&self, agent_id: &AgentId, repository_path: &str) -> Result<Option<Task>> {
        self.record(format!("claim_next_for({repository_path})"));
        self.take_injected_error()?;

        let mut tasks = self.tasks.lock();
        let candidate_id = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.repository_path == repository_path)
            .max_by_key(|t| (t.priority, std::cmp::Reverse(t.created_at)))
            .map(|t| t.id.clone());

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        let task = tasks.get_mut(&id).unwrap();
        task.status = TaskStatus::Assigned;
        task.agent_id = Some(agent_id.clone());
        task.started_at = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn mark_in_progress(&self, id: &TaskId) -> Result<Task> {
        self.record(format!("mark_in_progress({})", id.0));
        self.take_injected_error()?;
        self.transition(id, TaskStatus::InProgress, |task| {
            task.status = TaskStatus::InProgress;
        })
    }

    async fn complete(&self, id: &TaskId, result: String) -> Result<Task> {
        self.record(format!("complete({})", id.0));
        self.take_injected_error()?;
        self.transition(id, TaskStatus::Completed, |task| {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        })
    }

    async fn fail(&self, id: &TaskId, error: String) -> Result<Task> {
        self.record(format!("fail({})", id.0));
        self.take_injected_error()?;
        self.transition(id, TaskStatus::Failed, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
        })
    }

    async fn cancel(&self, id: &TaskId) -> Result<Task> {
        self.record(format!("cancel({})", id.0));
        self.take_injected_error()?;
        self.transition(id, TaskStatus::Cancelled, |task| {
            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Utc::now());
        })
    }

    async fn reclaim(&self, id: &TaskId) -> Result<Task> {
        self.record(format!("reclaim({})", id.0));
        self.take_injected_error()?;

        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::invalid_transition(task.status, TaskStatus::Pending));
        }
        task.status = TaskStatus::Pending;
        task.agent_id = None;
        task.started_at = None;
        task.retry_count += 1;
        Ok(task.clone())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.record(format!("get({})", id.0));
        self.take_injected_error()?;
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.record("list");
        self.take_injected_error()?;

        let tasks = self.tasks.lock();
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.repository_path.as_deref().is_none_or(|p| t.repository_path == p))
            .filter(|t| filter.agent_id.as_ref().is_none_or(|a| t.agent_id.as_ref() == Some(a)))
            .filter(|t| filter.workflow_id.as_deref().is_none_or(|w| t.workflow_id.as_deref() == Some(w)))
            .filter(|t| filter.created_from.is_none_or(|from| t.created_at >= from))
            .filter(|t| filter.created_to.is_none_or(|to| t.created_at <= to))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(offset) = filter.offset {
            result = result.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn list_reclaimable(&self, agent_ids: &[AgentId]) -> Result<Vec<Task>> {
        self.record("list_reclaimable");
        self.take_injected_error()?;

        let tasks = self.tasks.lock();
        Ok(tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress))
            .filter(|t| t.agent_id.as_ref().is_some_and(|a| agent_ids.contains(a)))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check");
        self.take_injected_error()
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        self.record("get_stats");
        self.take_injected_error()?;

        let tasks = self.tasks.lock();
        let mut stats = RepositoryStats { total_tasks: tasks.len() as u64, ..Default::default() };

        for task in tasks.values() {
            let key = task_status_key(task.status);
            *stats.tasks_by_status.entry(key).or_insert(0) += 1;
        }

        stats.latest_created = tasks.values().map(|t| t.created_at).max();
        stats.latest_completed = tasks.values().filter_map(|t| t.completed_at).max();

        Ok(stats)
    }
}

fn task_status_key(status: TaskStatus) -> String {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Assigned => "assigned",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
    .to_string()
}

impl MockTaskRepository {
    fn transition(&self, id: &TaskId, target: TaskStatus, apply: impl FnOnce(&mut Task)) -> Result<Task> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        if !task.status.can_transition_to(target) {
            return Err(OrchestratorError::invalid_transition(task.status, target));
        }
        apply(task);
        Ok(task.clone())
    }
}
