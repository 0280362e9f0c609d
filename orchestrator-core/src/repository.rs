use async_trait::async_trait;

use crate::{
    error::Result,
    models::{AgentId, NewTask, Task, TaskFilter, TaskId},
};

/// Transactional operations over the durable task store.
///
/// Implementations must be thread-safe and support concurrent access. The
/// single hard requirement beyond the obvious CRUD surface is
/// [`TaskRepository::claim_next_for`]: under concurrent callers, a given
/// task is returned to at most one agent.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persists a new task with `status = Pending`, `created_at = now`.
    /// Fails with `InvalidArgument` if `repository_path` is empty or
    /// `priority` is outside `[0, 9]`.
    async fn enqueue(&self, task: NewTask) -> Result<Task>;

    /// Atomically selects the highest-priority Pending task whose
    /// `repository_path` matches the agent's bound repository, sets
    /// `status = Assigned`, `agent_id = agent_id`, `started_at = now`, and
    /// returns it. Ties broken by oldest `created_at` first. Returns `None`
    /// if no eligible task exists.
    async fn claim_next_for(&self, agent_id: &AgentId, repository_path: &str) -> Result<Option<Task>>;

    /// Moves an Assigned task to InProgress.
    async fn mark_in_progress(&self, id: &TaskId) -> Result<Task>;

    /// Moves an InProgress task to Completed, recording `result` and
    /// `completed_at`.
    async fn complete(&self, id: &TaskId, result: String) -> Result<Task>;

    /// Moves an InProgress task to Failed, recording `error` and
    /// `completed_at`.
    async fn fail(&self, id: &TaskId, error: String) -> Result<Task>;

    /// Moves any non-terminal task to Cancelled.
    async fn cancel(&self, id: &TaskId) -> Result<Task>;

    /// Returns an orphaned Assigned/InProgress task to Pending and bumps
    /// `retry_count`. Used by the reaper when the owning agent has been
    /// Offline for longer than `T_reclaim`.
    async fn reclaim(&self, id: &TaskId) -> Result<Task>;

    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;

    /// Finds tasks currently Assigned/InProgress to agents that have been
    /// Offline for at least `threshold_ms`, for the periodic reaper.
    async fn list_reclaimable(&self, agent_ids: &[AgentId]) -> Result<Vec<Task>>;

    async fn health_check(&self) -> Result<()>;

    async fn get_stats(&self) -> Result<RepositoryStats>;
}

/// Repository statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositoryStats {
    pub total_tasks: u64,
    pub tasks_by_status: std::collections::HashMap<String, u64>,
    pub latest_created: Option<chrono::DateTime<chrono::Utc>>,
    pub latest_completed: Option<chrono::DateTime<chrono::Utc>>,
}
