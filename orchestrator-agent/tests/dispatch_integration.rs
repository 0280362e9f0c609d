//! End-to-end check that a claimed task actually runs as a local process
//! and settles back into the task store.

use std::sync::Arc;
use std::time::Duration;

use orchestrator_agent::executor::ProcessAgentExecutor;
use orchestrator_core::models::{Agent, TaskStatus};
use orchestrator_core::{AgentRegistry, Dispatcher, InMemoryAgentRegistry, TaskRepository};
use orchestrator_storage::SqliteTaskRepository;
use orchestrator_testkit::NewTaskBuilder;

/// Dispatch settles a claimed task's execution on its own spawned task, so
/// callers observing the task store must poll rather than assume
/// `dispatch_once` has already settled it by the time it returns.
async fn wait_for_terminal(repository: &SqliteTaskRepository, task_id: &orchestrator_core::models::TaskId) -> orchestrator_core::models::Task {
    for _ in 0..200 {
        let task = repository.get(task_id).await.unwrap().unwrap();
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not reach a terminal status in time");
}

#[tokio::test]
async fn dispatcher_runs_a_claimed_task_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().display().to_string();

    let db_path = dir.path().join("agent_integration.sqlite");
    let repository = Arc::new(SqliteTaskRepository::new(&format!("sqlite://{}", db_path.display())).await.unwrap());
    repository.migrate().await.unwrap();

    let registry = Arc::new(InMemoryAgentRegistry::new());
    let agent = Agent::new("worker-1".to_string(), "shell".to_string(), repo_path.clone());
    registry.register(agent.clone()).await.unwrap();

    let new_task = NewTaskBuilder::new().with_command("echo from-agent").with_repository_path(&repo_path).build();
    let task = repository.enqueue(new_task).await.unwrap();

    let executor = Arc::new(ProcessAgentExecutor::new());
    let dispatcher = Dispatcher::new(repository.clone(), registry.clone(), executor);

    let dispatched = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(dispatched, 1);

    let settled = wait_for_terminal(&repository, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Completed);
    assert!(settled.result.unwrap().contains("from-agent"));

    let idle_agent = registry.get(&agent.id).await.unwrap().unwrap();
    assert_eq!(idle_agent.status, orchestrator_core::models::AgentStatus::Idle);
}

#[tokio::test]
async fn dispatcher_reports_process_failure() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().display().to_string();
    let db_path = dir.path().join("agent_integration_failure.sqlite");

    let repository = Arc::new(SqliteTaskRepository::new(&format!("sqlite://{}", db_path.display())).await.unwrap());
    repository.migrate().await.unwrap();

    let registry = Arc::new(InMemoryAgentRegistry::new());
    let agent = Agent::new("worker-1".to_string(), "shell".to_string(), repo_path.clone());
    registry.register(agent.clone()).await.unwrap();

    let new_task = NewTaskBuilder::new().with_command("exit 1").with_repository_path(&repo_path).build();
    let task = repository.enqueue(new_task).await.unwrap();

    let executor = Arc::new(ProcessAgentExecutor::new());
    let dispatcher = Dispatcher::new(repository.clone(), registry.clone(), executor);
    dispatcher.dispatch_once().await.unwrap();

    let settled = wait_for_terminal(&repository, &task.id).await;
    assert_eq!(settled.status, TaskStatus::Failed);
    assert!(settled.error.is_some());
}
