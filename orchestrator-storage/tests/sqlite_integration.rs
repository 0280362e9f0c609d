use orchestrator_storage::{Agent, AgentId, AgentStatus, NewTask, SqliteAgentStore, SqliteTaskRepository, TaskFilter, TaskRepository, TaskStatus};
use std::time::Duration;
use tokio::time::Instant;

async fn create_test_repository() -> SqliteTaskRepository {
    let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    let thread_id = std::thread::current().id();
    let db_name = format!(":memory:test_{timestamp}_{thread_id:?}");
    let repo = SqliteTaskRepository::new(&db_name).await.unwrap();
    repo.migrate().await.unwrap();
    repo
}

fn task(repo_path: &str) -> NewTask {
    NewTask {
        command: "cargo build".to_string(),
        repository_path: repo_path.to_string(),
        priority: 5,
        correlation_id: None,
        workflow_id: None,
        parent_task_id: None,
        workflow_step_index: None,
    }
}

#[tokio::test]
async fn repository_creation_and_health() {
    let repo = create_test_repository().await;
    assert!(repo.health_check().await.is_ok());

    let stats = repo.get_stats().await.unwrap();
    assert_eq!(stats.total_tasks, 0);
    assert!(stats.tasks_by_status.is_empty());
}

#[tokio::test]
async fn full_task_lifecycle() {
    let repo = create_test_repository().await;

    let created = repo.enqueue(task("/repos/lifecycle")).await.unwrap();
    assert_eq!(created.status, TaskStatus::Pending);

    let agent_id = AgentId::new();
    let claimed = repo.claim_next_for(&agent_id, "/repos/lifecycle").await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::Assigned);

    let in_progress = repo.mark_in_progress(&claimed.id).await.unwrap();
    assert_eq!(in_progress.status, TaskStatus::InProgress);

    let completed = repo.complete(&claimed.id, "passed".to_string()).await.unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert!(completed.execution_duration_ms.is_some());
}

#[tokio::test]
async fn failed_task_can_be_reclaimed_for_retry() {
    let repo = create_test_repository().await;

    let created = repo.enqueue(task("/repos/retry")).await.unwrap();
    let agent_id = AgentId::new();
    repo.claim_next_for(&agent_id, "/repos/retry").await.unwrap();
    repo.mark_in_progress(&created.id).await.unwrap();
    let failed = repo.fail(&created.id, "agent crashed".to_string()).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);

    // Terminal states cannot be reclaimed.
    assert!(repo.reclaim(&created.id).await.is_err());
}

#[tokio::test]
async fn task_filtering_by_repository_and_status() {
    let repo = create_test_repository().await;

    let task_ids: Vec<_> = futures_util::future::join_all(vec![
        repo.enqueue(task("/repos/a")),
        repo.enqueue(task("/repos/a")),
        repo.enqueue(task("/repos/b")),
    ])
    .await
    .into_iter()
    .map(|t| t.unwrap())
    .collect();

    repo.claim_next_for(&AgentId::new(), "/repos/a").await.unwrap();

    let repo_a_tasks = repo.list(TaskFilter { repository_path: Some("/repos/a".to_string()), ..Default::default() }).await.unwrap();
    assert_eq!(repo_a_tasks.len(), 2);

    let pending_only = repo
        .list(TaskFilter { repository_path: Some("/repos/a".to_string()), status: Some(TaskStatus::Pending), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(pending_only.len(), 1);

    let all = repo.list(TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), task_ids.len());
}

#[tokio::test]
async fn reclaimable_tasks_are_scoped_to_requested_agents() {
    let repo = create_test_repository().await;
    let agent_a = AgentId::new();
    let agent_b = AgentId::new();

    let task_a = repo.enqueue(task("/repos/reclaim-scope")).await.unwrap();
    repo.claim_next_for(&agent_a, "/repos/reclaim-scope").await.unwrap();

    let task_b = repo.enqueue(task("/repos/reclaim-scope")).await.unwrap();
    repo.claim_next_for(&agent_b, "/repos/reclaim-scope").await.unwrap();
    let _ = task_b;

    let reclaimable = repo.list_reclaimable(&[agent_a.clone()]).await.unwrap();
    assert_eq!(reclaimable.len(), 1);
    assert_eq!(reclaimable[0].id, task_a.id);
}

#[tokio::test]
async fn performance_smoke_test() {
    let repo = create_test_repository().await;

    let start = Instant::now();
    let created = repo.enqueue(task("/repos/perf")).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(200), "enqueue took too long");

    let start = Instant::now();
    repo.get(&created.id).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(200), "get took too long");

    let start = Instant::now();
    repo.list(TaskFilter::default()).await.unwrap();
    assert!(start.elapsed() < Duration::from_millis(200), "list took too long");
}

#[tokio::test]
async fn concurrent_enqueues_all_succeed() {
    let repo = create_test_repository().await;
    let pool = repo.pool().clone();

    let mut handles = Vec::new();
    for i in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let repo = SqliteTaskRepository::from_pool(pool);
            repo.enqueue(task(&format!("/repos/concurrent-{i}"))).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 10);
}

#[tokio::test]
async fn agent_store_survives_across_repository_instances() {
    let repo = create_test_repository().await;
    let store = SqliteAgentStore::new(repo.pool().clone());

    let agent = Agent {
        id: AgentId::new(),
        name: "integration-agent".to_string(),
        agent_type: "claude-code".to_string(),
        repository_path: "/repos/perf".to_string(),
        status: AgentStatus::Idle,
        last_heartbeat: chrono::Utc::now(),
        current_task_id: None,
        completed_count: 0,
        failed_count: 0,
        total_execution_time_ms: 0,
    };
    store.upsert(&agent).await.unwrap();

    let reloaded = SqliteAgentStore::new(repo.pool().clone());
    let loaded = reloaded.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, agent.id);
}
