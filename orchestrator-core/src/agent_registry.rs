use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerAction, FailureType},
    dispatcher::CancellationToken,
    error::{OrchestratorError, Result},
    models::{Agent, AgentId, AgentStatus, TaskId},
};

/// Tracks agent liveness and availability, and brokers which agent an idle
/// slot should go to.
///
/// `PickIdleForRepo` and the heartbeat sweep are the two operations the
/// dispatcher and the reaper lean on; everything else is bookkeeping around
/// the agent lifecycle (`Idle -> Busy -> Idle`, `* -> Offline -> Idle`,
/// `* -> Error`).
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn register(&self, agent: Agent) -> Result<()>;

    async fn deregister(&self, id: &AgentId) -> Result<()>;

    async fn heartbeat(&self, id: &AgentId) -> Result<()>;

    async fn get(&self, id: &AgentId) -> Result<Option<Agent>>;

    async fn list(&self) -> Result<Vec<Agent>>;

    /// Distinct repository paths with at least one `Idle` agent.
    async fn repositories_with_idle_agents(&self) -> Vec<String>;

    /// Picks one `Idle` agent bound to `repository_path`, preferring the
    /// agent with the oldest heartbeat (round-robin fairness). Does not
    /// change agent state; the dispatcher calls `mark_busy` once it has
    /// actually claimed a task for it.
    async fn pick_idle_for_repo(&self, repository_path: &str) -> Option<Agent>;

    async fn mark_busy(&self, id: &AgentId, task_id: &TaskId) -> Result<()>;

    async fn mark_idle(&self, id: &AgentId) -> Result<()>;

    /// Records a successful task completion against the agent's rolling
    /// stats and resets its circuit breaker.
    async fn record_success(&self, id: &AgentId) -> Result<()>;

    /// Records a task failure. If the agent's circuit breaker trips, the
    /// agent is driven to `Error` (quarantined) instead of back to `Idle`.
    async fn record_failure(&self, id: &AgentId) -> Result<()>;

    /// Returns a cancellation token scoped to the agent's current task, if
    /// it has one in flight.
    async fn cancellation_for(&self, id: &AgentId) -> Option<CancellationToken>;

    /// Sweeps agents whose `last_heartbeat` is older than `threshold`,
    /// driving them to `Offline`. Returns the ids that changed state.
    async fn sweep_stale(&self, threshold: Duration) -> Vec<AgentId>;
}

struct AgentEntry {
    agent: Agent,
    breaker: CircuitBreaker,
    cancellation: CancellationToken,
}

/// In-process agent registry guarded by a single `RwLock`.
///
/// Adequate for a single-node orchestrator; a clustered deployment would
/// replace this with a registry backed by the same storage as the task
/// repository. Kept in-memory here because agent liveness is inherently
/// process-local (a heartbeat only means something to the process that is
/// receiving it).
pub struct InMemoryAgentRegistry {
    agents: RwLock<HashMap<AgentId, AgentEntry>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self { agents: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryAgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn register(&self, agent: Agent) -> Result<()> {
        let mut agents = self.agents.write().await;
        info!(agent_id = %agent.id, repository = %agent.repository_path, "agent registered");
        agents.insert(
            agent.id.clone(),
            AgentEntry {
                agent,
                breaker: CircuitBreaker::default(),
                cancellation: CancellationToken::new(),
            },
        );
        Ok(())
    }

    async fn deregister(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write().await;
        agents.remove(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        Ok(())
    }

    async fn heartbeat(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        entry.agent.last_heartbeat = Utc::now();
        if entry.agent.status == AgentStatus::Offline {
            entry.agent.status = AgentStatus::Idle;
            info!(agent_id = %id, "agent came back online");
        }
        Ok(())
    }

    async fn get(&self, id: &AgentId) -> Result<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.get(id).map(|e| e.agent.clone()))
    }

    async fn list(&self) -> Result<Vec<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.values().map(|e| e.agent.clone()).collect())
    }

    async fn repositories_with_idle_agents(&self) -> Vec<String> {
        let agents = self.agents.read().await;
        let mut repos: Vec<String> = agents
            .values()
            .filter(|e| e.agent.status == AgentStatus::Idle)
            .map(|e| e.agent.repository_path.clone())
            .collect();
        repos.sort();
        repos.dedup();
        repos
    }

    async fn pick_idle_for_repo(&self, repository_path: &str) -> Option<Agent> {
        let agents = self.agents.read().await;
        agents
            .values()
            .filter(|e| e.agent.status == AgentStatus::Idle && e.agent.repository_path == repository_path)
            .min_by_key(|e| e.agent.last_heartbeat)
            .map(|e| e.agent.clone())
    }

    async fn mark_busy(&self, id: &AgentId, task_id: &TaskId) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        entry.agent.status = AgentStatus::Busy;
        entry.agent.current_task_id = Some(task_id.clone());
        entry.cancellation = CancellationToken::new();
        Ok(())
    }

    async fn mark_idle(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        if entry.agent.status != AgentStatus::Error {
            entry.agent.status = AgentStatus::Idle;
        }
        entry.agent.current_task_id = None;
        Ok(())
    }

    async fn record_success(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        entry.agent.completed_count += 1;
        entry.breaker.record_success();
        Ok(())
    }

    async fn record_failure(&self, id: &AgentId) -> Result<()> {
        let mut agents = self.agents.write().await;
        let entry = agents.get_mut(id).ok_or_else(|| OrchestratorError::not_found_id(&id.0))?;
        entry.agent.failed_count += 1;

        let action = entry.breaker.record_failure(FailureType::LogicError);
        if let CircuitBreakerAction::Quarantine { reason } = action {
            warn!(agent_id = %id, reason = %reason, "agent quarantined");
            entry.agent.status = AgentStatus::Error;
        }
        Ok(())
    }

    async fn cancellation_for(&self, id: &AgentId) -> Option<CancellationToken> {
        let agents = self.agents.read().await;
        agents.get(id).map(|e| e.cancellation.clone())
    }

    async fn sweep_stale(&self, threshold: Duration) -> Vec<AgentId> {
        let mut agents = self.agents.write().await;
        let now = Utc::now();
        let mut changed = Vec::new();

        for entry in agents.values_mut() {
            if entry.agent.status == AgentStatus::Offline {
                continue;
            }
            let elapsed = now - entry.agent.last_heartbeat;
            if elapsed.num_milliseconds() as u128 > threshold.as_millis() {
                entry.agent.status = AgentStatus::Offline;
                entry.cancellation.cancel();
                changed.push(entry.agent.id.clone());
            }
        }

        changed
    }
}

/// Arc-sharable wrapper so the dispatcher, reaper, and API surface can all
/// hold a cheap handle to the same registry.
pub type SharedAgentRegistry = Arc<dyn AgentRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(repo: &str) -> Agent {
        Agent::new("worker".to_string(), "shell".to_string(), repo.to_string())
    }

    #[tokio::test]
    async fn pick_idle_for_repo_ignores_other_repos() {
        let registry = InMemoryAgentRegistry::new();
        let a = agent("/repo/a");
        let b = agent("/repo/b");
        registry.register(a.clone()).await.unwrap();
        registry.register(b.clone()).await.unwrap();

        let picked = registry.pick_idle_for_repo("/repo/a").await.unwrap();
        assert_eq!(picked.id, a.id);
    }

    #[tokio::test]
    async fn busy_agent_is_not_picked() {
        let registry = InMemoryAgentRegistry::new();
        let a = agent("/repo/a");
        registry.register(a.clone()).await.unwrap();
        registry.mark_busy(&a.id, &TaskId::new()).await.unwrap();

        assert!(registry.pick_idle_for_repo("/repo/a").await.is_none());
    }

    #[tokio::test]
    async fn repeated_failures_quarantine_agent() {
        let registry = InMemoryAgentRegistry::new();
        let a = agent("/repo/a");
        registry.register(a.clone()).await.unwrap();

        for _ in 0..3 {
            registry.record_failure(&a.id).await.unwrap();
        }

        let reloaded = registry.get(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AgentStatus::Error);
        assert!(registry.pick_idle_for_repo("/repo/a").await.is_none());
    }

    #[tokio::test]
    async fn sweep_stale_marks_offline_and_cancels() {
        let registry = InMemoryAgentRegistry::new();
        let mut a = agent("/repo/a");
        a.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        registry.register(a.clone()).await.unwrap();

        let cancellation = registry.cancellation_for(&a.id).await.unwrap();
        let changed = registry.sweep_stale(Duration::from_secs(30)).await;

        assert_eq!(changed, vec![a.id.clone()]);
        assert!(cancellation.is_cancelled());
        let reloaded = registry.get(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AgentStatus::Offline);
    }

    #[tokio::test]
    async fn heartbeat_brings_offline_agent_back() {
        let registry = InMemoryAgentRegistry::new();
        let mut a = agent("/repo/a");
        a.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        registry.register(a.clone()).await.unwrap();
        registry.sweep_stale(Duration::from_secs(30)).await;

        registry.heartbeat(&a.id).await.unwrap();
        let reloaded = registry.get(&a.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AgentStatus::Idle);
    }
}
