//! Integration tests for the testkit crate's own utilities.

use orchestrator_core::{
    dispatcher::{AgentContext, AgentExecutor, CancellationToken, ExecutionOutcome},
    error::OrchestratorError,
    models::{AgentId, TaskStatus},
    repository::TaskRepository,
};
use orchestrator_testkit::*;

#[tokio::test]
async fn mock_repository_basic_operations() {
    let repo = MockTaskRepository::new();

    let new_task = create_new_task();
    let task = repo.enqueue(new_task).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    repo.assert_called("enqueue");

    let retrieved = repo.get(&task.id).await.unwrap().unwrap();
    assert_eq!(retrieved.id, task.id);
    repo.assert_called("get");
}

#[tokio::test]
async fn mock_repository_error_injection() {
    let repo = MockTaskRepository::new();

    repo.inject_error(OrchestratorError::Storage("simulated outage".to_string()));
    let result = repo.health_check().await;
    assert!(matches!(result, Err(OrchestratorError::Storage(_))));

    // Error injection consumes itself; the next call succeeds.
    assert!(repo.health_check().await.is_ok());
}

#[tokio::test]
async fn mock_repository_state_transitions() {
    let repo = MockTaskRepository::new();
    let task = repo.enqueue(create_new_task()).await.unwrap();

    let claimed = repo.claim_next_for(&AgentId::new(), &task.repository_path).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Assigned);

    let in_progress = repo.mark_in_progress(&task.id).await.unwrap();
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    // Pending -> Completed directly is illegal; must go through InProgress.
    let other = repo.enqueue(create_new_task()).await.unwrap();
    let result = repo.complete(&other.id, "skip".to_string()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fixtures_create_tasks_in_all_states() {
    let tasks = create_tasks_in_all_states();
    assert_eq!(tasks.len(), 6);

    let statuses: Vec<_> = tasks.iter().map(|t| t.status).collect();
    assert!(statuses.contains(&TaskStatus::Pending));
    assert!(statuses.contains(&TaskStatus::Completed));
    assert!(statuses.contains(&TaskStatus::Cancelled));
}

#[tokio::test]
async fn builders_task_builder() {
    let task = TaskBuilder::new()
        .with_command("echo built")
        .with_repository_path("/repos/builder")
        .with_status(TaskStatus::InProgress)
        .build();

    assert_eq!(task.command, "echo built");
    assert_eq!(task.repository_path, "/repos/builder");
    assert_eq!(task.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn assertions_task_equals() {
    let task1 = create_test_task();
    let mut task2 = task1.clone();
    assert_task_equals(&task1, &task2);

    task2.command = "different".to_string();
    let result = std::panic::catch_unwind(|| assert_task_equals(&task1, &task2));
    assert!(result.is_err());
}

#[tokio::test]
async fn assertions_state_transitions() {
    assert_state_transition_valid(TaskStatus::Pending, TaskStatus::Assigned);
    assert_state_transition_valid(TaskStatus::Assigned, TaskStatus::InProgress);
    assert_state_transition_invalid(TaskStatus::Pending, TaskStatus::Completed);
    assert_state_transition_invalid(TaskStatus::Completed, TaskStatus::InProgress);
}

#[tokio::test]
async fn generators_realistic_data() {
    let task = generate_random_task();
    assert!(!task.command.is_empty());
    assert!(task.repository_path.starts_with("/repos/"));
    assert!((0..10).contains(&task.priority));
}

#[tokio::test]
async fn mock_repository_concurrent_enqueues() {
    use std::sync::Arc;
    use tokio::task::JoinSet;

    let repo = Arc::new(MockTaskRepository::new());
    let mut set = JoinSet::new();

    for i in 0..10 {
        let repo_clone = repo.clone();
        set.spawn(async move {
            let new_task = NewTaskBuilder::new().with_command(format!("task-{i}")).build();
            repo_clone.enqueue(new_task).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }

    assert_eq!(tasks.len(), 10);
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10, "every claimed id must be unique");
}

#[tokio::test]
async fn mock_repository_stats() {
    let repo = MockTaskRepository::with_tasks(create_tasks_in_all_states());
    let stats = repo.get_stats().await.unwrap();

    assert_eq!(stats.total_tasks, 6);
    assert!(stats.tasks_by_status.contains_key("pending"));
    assert!(stats.tasks_by_status.contains_key("completed"));
    assert!(stats.latest_created.is_some());
}

#[tokio::test]
async fn contract_suite_passes_against_mock() {
    let repo = MockTaskRepository::new();
    contracts::test_repository_contract(&repo).await;

    let history = repo.call_history();
    assert!(history.iter().any(|call| call.starts_with("enqueue")));
    assert!(history.iter().any(|call| call.starts_with("get")));
}

#[tokio::test]
async fn scripted_agent_executor_returns_queued_outcomes() {
    let executor = ScriptedAgentExecutor::new();
    executor.push_outcome(ExecutionOutcome::Success("first".to_string()));
    executor.push_outcome(ExecutionOutcome::Failure("second".to_string()));

    let task = create_test_task();
    let ctx = AgentContext { agent_id: AgentId::new(), cancellation: CancellationToken::new() };

    let first = executor.execute(&task, &ctx).await;
    assert!(matches!(first, ExecutionOutcome::Success(s) if s == "first"));

    let second = executor.execute(&task, &ctx).await;
    assert!(matches!(second, ExecutionOutcome::Failure(s) if s == "second"));

    assert_eq!(executor.call_count(), 2);
}
