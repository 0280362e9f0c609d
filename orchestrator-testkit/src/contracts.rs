//! Contract test helpers for validating [`TaskRepository`] implementations.
//!
//! Any implementation — in-memory or SQLite-backed — should pass this suite
//! to be considered conformant. `orchestrator-storage`'s integration tests
//! drive it against [`crate::MockTaskRepository`] and against
//! `SqliteTaskRepository`.

use orchestrator_core::{
    error::OrchestratorError,
    models::{AgentId, TaskId, TaskStatus},
    repository::TaskRepository,
};

use crate::builders::{NewTaskBuilder, TaskFilterBuilder};

/// Runs every contract test against `repo`.
pub async fn test_repository_contract<R: TaskRepository>(repo: &R) {
    test_health_check_contract(repo).await;
    test_enqueue_contract(repo).await;
    test_get_contract(repo).await;
    test_claim_contract(repo).await;
    test_state_transitions_contract(repo).await;
    test_reclaim_contract(repo).await;
    test_listing_contract(repo).await;
    test_not_found_errors_contract(repo).await;
    test_stats_contract(repo).await;
}

pub async fn test_health_check_contract<R: TaskRepository>(repo: &R) {
    repo.health_check().await.expect("health check should succeed for a working repository");
}

pub async fn test_enqueue_contract<R: TaskRepository>(repo: &R) {
    let new_task = NewTaskBuilder::new().with_repository_path("/repos/enqueue-test").build();
    let task = repo.enqueue(new_task.clone()).await.expect("enqueue should succeed");

    assert_eq!(task.command, new_task.command);
    assert_eq!(task.repository_path, new_task.repository_path);
    assert_eq!(task.status, TaskStatus::Pending, "new tasks start Pending");
    assert_eq!(task.retry_count, 0);
    assert!(task.agent_id.is_none());
    assert!(task.started_at.is_none());

    let bad_task = NewTaskBuilder::new().with_repository_path("").build();
    let result = repo.enqueue(bad_task).await;
    assert!(result.is_err(), "empty repository_path should be rejected");
}

pub async fn test_get_contract<R: TaskRepository>(repo: &R) {
    let new_task = NewTaskBuilder::new().with_repository_path("/repos/get-test").build();
    let task = repo.enqueue(new_task).await.expect("enqueue should succeed");

    let fetched = repo.get(&task.id).await.expect("get should succeed").expect("task should exist");
    assert_eq!(fetched.id, task.id);

    let missing = repo.get(&TaskId("does-not-exist".to_string())).await.expect("get should not error for missing id");
    assert!(missing.is_none());
}

pub async fn test_claim_contract<R: TaskRepository>(repo: &R) {
    let repo_path = "/repos/claim-test";
    let low = repo.enqueue(NewTaskBuilder::new().with_repository_path(repo_path).with_priority(1).build()).await.unwrap();
    let high = repo.enqueue(NewTaskBuilder::new().with_repository_path(repo_path).with_priority(9).build()).await.unwrap();

    let agent_id = AgentId::new();
    let claimed = repo
        .claim_next_for(&agent_id, repo_path)
        .await
        .expect("claim should succeed")
        .expect("an eligible task exists");
    assert_eq!(claimed.id, high.id, "higher priority task claimed first");
    assert_eq!(claimed.status, TaskStatus::Assigned);
    assert_eq!(claimed.agent_id, Some(agent_id.clone()));
    assert!(claimed.started_at.is_some());

    let next = repo.claim_next_for(&agent_id, repo_path).await.unwrap().expect("the low-priority task remains");
    assert_eq!(next.id, low.id);

    assert!(repo.claim_next_for(&agent_id, repo_path).await.unwrap().is_none(), "no eligible tasks remain");
    assert!(
        repo.claim_next_for(&agent_id, "/repos/other").await.unwrap().is_none(),
        "claim is scoped to repository_path"
    );
}

pub async fn test_state_transitions_contract<R: TaskRepository>(repo: &R) {
    let agent_id = AgentId::new();
    let task = repo.enqueue(NewTaskBuilder::new().with_repository_path("/repos/transitions").build()).await.unwrap();
    let claimed = repo.claim_next_for(&agent_id, "/repos/transitions").await.unwrap().unwrap();
    assert_eq!(claimed.id, task.id);

    let in_progress = repo.mark_in_progress(&task.id).await.expect("Assigned -> InProgress should succeed");
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    let completed = repo.complete(&task.id, "ok".to_string()).await.expect("InProgress -> Completed should succeed");
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.result.as_deref(), Some("ok"));
    assert!(completed.completed_at.is_some());

    let reopened = repo.mark_in_progress(&task.id).await;
    assert!(reopened.is_err(), "Completed is terminal and must not accept further transitions");
}

pub async fn test_reclaim_contract<R: TaskRepository>(repo: &R) {
    let agent_id = AgentId::new();
    let task = repo.enqueue(NewTaskBuilder::new().with_repository_path("/repos/reclaim").build()).await.unwrap();
    repo.claim_next_for(&agent_id, "/repos/reclaim").await.unwrap().unwrap();

    let reclaimed = repo.reclaim(&task.id).await.expect("reclaim should succeed");
    assert_eq!(reclaimed.status, TaskStatus::Pending);
    assert!(reclaimed.agent_id.is_none());
    assert!(reclaimed.started_at.is_none());
    assert_eq!(reclaimed.retry_count, 1, "reclaim bumps retry_count");

    let claimed_again = repo.claim_next_for(&agent_id, "/repos/reclaim").await.unwrap();
    assert!(claimed_again.is_some(), "a reclaimed task is eligible to be claimed again");
}

pub async fn test_listing_contract<R: TaskRepository>(repo: &R) {
    let repo_path = "/repos/listing-test";
    for i in 0..3 {
        repo.enqueue(NewTaskBuilder::new().with_repository_path(repo_path).with_priority(i).build()).await.unwrap();
    }

    let all = repo.list(TaskFilterBuilder::new().with_repository_path(repo_path).build()).await.unwrap();
    assert_eq!(all.len(), 3);

    let pending_only = repo
        .list(TaskFilterBuilder::new().with_repository_path(repo_path).with_status(TaskStatus::Pending).build())
        .await
        .unwrap();
    assert_eq!(pending_only.len(), 3);

    let limited = repo.list(TaskFilterBuilder::new().with_repository_path(repo_path).with_limit(1).build()).await.unwrap();
    assert_eq!(limited.len(), 1);
}

pub async fn test_not_found_errors_contract<R: TaskRepository>(repo: &R) {
    let missing = TaskId("no-such-task".to_string());

    let result = repo.mark_in_progress(&missing).await;
    assert!(matches!(result, Err(OrchestratorError::NotFound(_))));

    let result = repo.complete(&missing, "x".to_string()).await;
    assert!(matches!(result, Err(OrchestratorError::NotFound(_))));

    let result = repo.reclaim(&missing).await;
    assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
}

pub async fn test_stats_contract<R: TaskRepository>(repo: &R) {
    repo.enqueue(NewTaskBuilder::new().with_repository_path("/repos/stats-test").build()).await.unwrap();

    let stats = repo.get_stats().await.expect("get_stats should succeed");
    assert!(stats.total_tasks > 0, "should report at least one task");
    assert!(!stats.tasks_by_status.is_empty(), "should have a status breakdown");
    assert!(stats.latest_created.is_some(), "should have a latest creation timestamp");
}
