use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use orchestrator_core::dispatcher::CancellationToken;
use orchestrator_core::models::Agent;
use orchestrator_core::{AgentRegistry, Dispatcher, InMemoryAgentRegistry, TaskRepository};
use orchestrator_storage::{SqliteAgentStore, SqliteTaskRepository};
use tracing::{error, info, warn};

use orchestrator_agent::config::Config;
use orchestrator_agent::executor::ProcessAgentExecutor;
use orchestrator_agent::telemetry::{init_telemetry, log_config_validation, log_shutdown_info, log_startup_info};

#[derive(Parser)]
#[command(name = "orchestrator-agent")]
#[command(about = "Runs the task dispatcher: claims pending tasks and hands them to local process agents")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path (overrides bundled defaults)
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Storage connection string override
    #[arg(long, env = "STORAGE_URL")]
    storage_url: Option<String>,

    /// Repository path to host a local process agent for. Repeatable; at
    /// least one is required for the dispatcher to have anywhere to send
    /// claimed tasks.
    #[arg(long = "repository", required = true)]
    repositories: Vec<String>,

    /// Number of local agents to register per repository.
    #[arg(long, default_value = "1")]
    agents_per_repository: usize,

    /// Agent type label recorded against registered agents.
    #[arg(long, default_value = "shell")]
    agent_type: String,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(ref storage_url) = cli.storage_url {
        config.storage.url = storage_url.clone();
    }

    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).context("failed to load configuration")?;

    init_telemetry(&config.logging).context("failed to initialize telemetry")?;
    log_config_validation(&config);
    config.validate().context("configuration is invalid")?;
    log_startup_info(&config);

    let repository = SqliteTaskRepository::new(&config.storage_url()).await.context("failed to open task store")?;
    repository.migrate().await.context("failed to run task store migrations")?;
    repository.health_check().await.context("task store health check failed")?;

    let agent_store = SqliteAgentStore::new(repository.pool().clone());
    recover_stale_sessions(&agent_store).await;

    let registry = InMemoryAgentRegistry::new();
    let mut local_agents = Vec::new();
    for repository_path in &cli.repositories {
        for n in 0..cli.agents_per_repository {
            let agent = Agent::new(format!("local-{n}"), cli.agent_type.clone(), repository_path.clone());
            agent_store.upsert(&agent).await.context("failed to persist registered agent")?;
            agent_store.open_session(&agent.id).await.context("failed to open agent session")?;
            registry.register(agent.clone()).await.context("failed to register agent")?;
            info!(agent_id = %agent.id, repository = %repository_path, "registered local agent");
            local_agents.push(agent);
        }
    }

    let repository = Arc::new(repository);
    let registry = Arc::new(registry);
    let executor = Arc::new(ProcessAgentExecutor::new());

    let dispatcher = Dispatcher::new(repository.clone(), registry.clone(), executor);
    let shutdown = CancellationToken::new();

    let dispatcher_handle = tokio::spawn({
        let dispatcher = dispatcher;
        let shutdown = shutdown.clone();
        let poll_interval = config.poll_interval();
        async move {
            dispatcher.run(poll_interval, shutdown).await;
        }
    });

    let reaper_handle = tokio::spawn(run_reaper(
        repository.clone(),
        registry.clone(),
        config.offline_threshold(),
        config.reclaim_threshold(),
        shutdown.clone(),
    ));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();

    let _ = dispatcher_handle.await;
    let _ = reaper_handle.await;

    for agent in &local_agents {
        if let Err(e) = agent_store.close_latest_session(&agent.id, "graceful_shutdown").await {
            warn!(agent_id = %agent.id, error = %e, "failed to close agent session on shutdown");
        }
    }

    log_shutdown_info();
    Ok(())
}

/// Closes any session a previous, uncleanly-terminated process left open, so
/// the `agent_sessions` table doesn't accumulate sessions nothing will ever
/// close. The agents themselves are re-registered fresh below; this only
/// reconciles the durable history.
async fn recover_stale_sessions(agent_store: &SqliteAgentStore) {
    match agent_store.agents_with_open_sessions().await {
        Ok(ids) if ids.is_empty() => {}
        Ok(ids) => {
            warn!(count = ids.len(), "found open agent sessions from a previous run, closing them");
            for id in ids {
                if let Err(e) = agent_store.close_latest_session(&id, "restart_recovery").await {
                    error!(agent_id = %id, error = %e, "failed to close stale session");
                }
            }
        }
        Err(e) => error!(error = %e, "failed to scan for open agent sessions"),
    }
}

/// Periodically sweeps agents whose heartbeat has gone stale and reclaims
/// any task still assigned to an agent that has been offline for longer than
/// `reclaim_threshold`, returning it to `Pending` so another agent can claim it.
async fn run_reaper<R: TaskRepository + ?Sized, A: AgentRegistry + ?Sized>(
    repository: Arc<R>,
    registry: Arc<A>,
    offline_threshold: Duration,
    reclaim_threshold: Duration,
    shutdown: CancellationToken,
) {
    let sweep_interval = offline_threshold / 2;
    info!("reaper loop starting");

    loop {
        if !shutdown.sleep_or_cancel(sweep_interval).await && shutdown.is_cancelled() {
            info!("reaper loop shutting down");
            break;
        }

        let offline = registry.sweep_stale(offline_threshold).await;
        if !offline.is_empty() {
            info!(count = offline.len(), "agents marked offline");
        }

        let agents = match registry.list().await {
            Ok(agents) => agents,
            Err(e) => {
                error!(error = %e, "failed to list agents for reclaim sweep");
                continue;
            }
        };

        let stale_ids: Vec<_> = agents
            .into_iter()
            .filter(|agent| agent.status == orchestrator_core::models::AgentStatus::Offline)
            .filter(|agent| {
                chrono::Utc::now() - agent.last_heartbeat >= chrono::Duration::from_std(reclaim_threshold).unwrap_or_default()
            })
            .map(|agent| agent.id)
            .collect();

        if stale_ids.is_empty() {
            continue;
        }

        match repository.list_reclaimable(&stale_ids).await {
            Ok(tasks) => {
                for task in tasks {
                    match repository.reclaim(&task.id).await {
                        Ok(_) => info!(task_id = %task.id, "reclaimed task from offline agent"),
                        Err(e) => error!(task_id = %task.id, error = %e, "failed to reclaim task"),
                    }
                }
            }
            Err(e) => error!(error = %e, "failed to list reclaimable tasks"),
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
        info!("received Ctrl+C");
    }
}
