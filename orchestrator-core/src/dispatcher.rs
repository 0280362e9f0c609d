use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::{
    agent_registry::AgentRegistry,
    error::Result,
    models::{AgentId, Task},
    repository::TaskRepository,
};

/// A cooperative cancellation signal shared between a workflow execution (or
/// a dispatched task) and whatever is currently waiting on its behalf.
///
/// Cloning shares the underlying flag; `cancel` is idempotent and wakes every
/// waiter.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early if cancellation fires.
    /// Returns `true` if the sleep completed, `false` if interrupted.
    pub async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.notify.notified() => false,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Context handed to the executor adapter for one dispatched task.
pub struct AgentContext {
    pub agent_id: AgentId,
    pub cancellation: CancellationToken,
}

/// Outcome of one agent execution, as reported back by the adapter.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success(String),
    Failure(String),
}

/// Opaque sink the dispatcher hands a claimed task to.
///
/// Implementations abstract over any concrete transport: a local process, an
/// RPC call, a shell invocation. They must honor `agent_ctx.cancellation`
/// promptly, returning `Failure` on cancellation rather than hanging.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, task: &Task, agent_ctx: &AgentContext) -> ExecutionOutcome;
}

/// Matches pending tasks to idle agents using priority and repository
/// affinity.
///
/// Dispatch is cooperative and non-blocking: the dispatcher never holds a
/// lock across the executor call, and never awaits one claimed task's full
/// execution before looking at the next repository's idle agent. Within a
/// repository, tasks are ordered by `(-priority, created_at)` by the
/// repository's `claim_next_for`; across repositories, this dispatcher
/// visits repositories round-robin so a hot repository cannot starve the
/// others. Each claimed task's execution runs on its own spawned task so a
/// single long-running agent call never blocks the rest of a dispatch pass.
pub struct Dispatcher<R, A, E>
where
    R: TaskRepository + ?Sized,
    A: AgentRegistry + ?Sized,
    E: AgentExecutor + ?Sized,
{
    repository: Arc<R>,
    registry: Arc<A>,
    executor: Arc<E>,
}

impl<R, A, E> Dispatcher<R, A, E>
where
    R: TaskRepository + ?Sized + 'static,
    A: AgentRegistry + ?Sized + 'static,
    E: AgentExecutor + ?Sized + 'static,
{
    pub fn new(repository: Arc<R>, registry: Arc<A>, executor: Arc<E>) -> Self {
        Self { repository, registry, executor }
    }

    /// Runs one dispatch pass: for every distinct repository with at least
    /// one idle agent, attempt to claim and hand off a task. Returns the
    /// number of tasks dispatched; a dispatched task's execution is still
    /// in flight (on its own spawned task) by the time this returns.
    pub async fn dispatch_once(&self) -> Result<usize> {
        let mut dispatched = 0;
        let repos = self.registry.repositories_with_idle_agents().await;

        for repo in repos {
            let Some(agent) = self.registry.pick_idle_for_repo(&repo).await else {
                continue;
            };

            let Some(task) = self.repository.claim_next_for(&agent.id, &repo).await? else {
                continue;
            };

            info!(task_id = %task.id, agent_id = %agent.id, repository = %repo, "dispatching task");
            self.registry.mark_busy(&agent.id, &task.id).await?;

            let repository = self.repository.clone();
            let registry = self.registry.clone();
            let executor = self.executor.clone();
            let agent_id = agent.id.clone();
            tokio::spawn(async move {
                Self::run_and_settle(repository, registry, executor, task, agent_id).await;
            });
            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Hands the task to the executor adapter and translates its completion
    /// event into a repository transition plus an agent transition back to
    /// Idle. Runs on its own spawned task so the dispatch loop never blocks
    /// on one agent's full execution.
    async fn run_and_settle(repository: Arc<R>, registry: Arc<A>, executor: Arc<E>, task: Task, agent_id: AgentId) {
        let cancellation = registry.cancellation_for(&agent_id).await.unwrap_or_default();
        let ctx = AgentContext { agent_id: agent_id.clone(), cancellation };

        if let Err(e) = repository.mark_in_progress(&task.id).await {
            warn!(task_id = %task.id, error = %e, "failed to mark task in progress");
        }

        let outcome = executor.execute(&task, &ctx).await;

        let settle_result = match outcome {
            ExecutionOutcome::Success(result) => {
                debug!(task_id = %task.id, "task succeeded");
                let settled = repository.complete(&task.id, result).await;
                if let Err(e) = registry.record_success(&agent_id).await {
                    warn!(agent_id = %agent_id, error = %e, "failed to record agent success");
                }
                settled
            }
            ExecutionOutcome::Failure(error) => {
                error!(task_id = %task.id, error = %error, "task failed");
                let settled = repository.fail(&task.id, error).await;
                if let Err(e) = registry.record_failure(&agent_id).await {
                    warn!(agent_id = %agent_id, error = %e, "failed to record agent failure");
                }
                settled
            }
        };

        if let Err(e) = settle_result {
            error!(task_id = %task.id, error = %e, "failed to persist task settlement");
        }

        if let Err(e) = registry.mark_idle(&agent_id).await {
            warn!(agent_id = %agent_id, error = %e, "failed to return agent to idle");
        }
    }

    /// Runs `dispatch_once` on a fixed interval until `shutdown` fires.
    pub async fn run(&self, poll_interval: Duration, shutdown: CancellationToken) {
        info!("dispatcher loop starting");
        loop {
            match self.dispatch_once().await {
                Ok(n) if n > 0 => debug!(dispatched = n, "dispatch pass completed"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "dispatch pass failed"),
            }

            if !shutdown.sleep_or_cancel(poll_interval).await {
                if shutdown.is_cancelled() {
                    info!("dispatcher loop shutting down");
                    break;
                }
            }
        }
    }
}
