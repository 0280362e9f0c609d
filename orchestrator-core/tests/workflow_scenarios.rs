//! End-to-end workflow scenarios with literal inputs and expected outputs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orchestrator_core::error::OrchestratorError;
use orchestrator_core::models::{
    RetryPolicy, StepStatus, StepType, WorkflowContext, WorkflowDefinition, WorkflowMetadata, WorkflowStatus,
    WorkflowStep,
};
use orchestrator_core::workflow_engine::{StepRunner, WorkflowEngine};
use serde_json::Value;

fn workflow(id: &str, steps: Vec<WorkflowStep>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: id.to_string(),
        name: id.to_string(),
        steps,
        variables: HashMap::new(),
        metadata: WorkflowMetadata::default(),
    }
}

struct EchoRunner {
    calls: Mutex<Vec<String>>,
}

impl EchoRunner {
    fn new() -> Self {
        Self { calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl StepRunner for EchoRunner {
    async fn run_step(&self, step: &WorkflowStep, _ctx: &WorkflowContext) -> Result<Value, String> {
        self.calls.lock().unwrap().push(step.id.clone());
        Ok(Value::from(step.id.clone()))
    }
}

/// S1 — linear workflow. Steps A->B->C->D, each a no-op returning its id.
#[tokio::test]
async fn s1_linear_workflow_completes_in_order() {
    let runner = Arc::new(EchoRunner::new());
    let engine = WorkflowEngine::new(runner);
    let wf = workflow(
        "s1-linear",
        vec![
            WorkflowStep::new("A", StepType::Task),
            WorkflowStep::new("B", StepType::Task).with_depends_on(["A"]),
            WorkflowStep::new("C", StepType::Task).with_depends_on(["B"]),
            WorkflowStep::new("D", StepType::Task).with_depends_on(["C"]),
        ],
    );

    let result = engine.start(wf, HashMap::new()).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    let ids: Vec<_> = result.step_results.iter().map(|r| r.step_id.clone()).collect();
    assert_eq!(ids, vec!["A", "B", "C", "D"]);
    assert!(result.output.contains_key("_executionId"));
}

/// S2 — diamond. A->{B,C}->D, all no-ops.
#[tokio::test]
async fn s2_diamond_runs_both_branches_before_joining() {
    let runner = Arc::new(EchoRunner::new());
    let engine = WorkflowEngine::new(runner);
    let wf = workflow(
        "s2-diamond",
        vec![
            WorkflowStep::new("A", StepType::Task),
            WorkflowStep::new("B", StepType::Task).with_depends_on(["A"]),
            WorkflowStep::new("C", StepType::Task).with_depends_on(["A"]),
            WorkflowStep::new("D", StepType::Task).with_depends_on(["B", "C"]),
        ],
    );

    let result = engine.start(wf, HashMap::new()).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.step_results[0].step_id, "A");
    assert_eq!(result.step_results[3].step_id, "D");
    let before_d: Vec<_> = result.step_results[..3].iter().map(|r| r.step_id.as_str()).collect();
    assert!(before_d.contains(&"B"));
    assert!(before_d.contains(&"C"));
}

struct FailingBranchRunner {
    fail_steps: Vec<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl StepRunner for FailingBranchRunner {
    async fn run_step(&self, step: &WorkflowStep, _ctx: &WorkflowContext) -> Result<Value, String> {
        self.calls.lock().unwrap().push(step.id.clone());
        if self.fail_steps.contains(&step.id) {
            Err(format!("{} failed", step.id))
        } else {
            Ok(Value::from(step.id.clone()))
        }
    }
}

/// S2b — diamond with a failing branch. A->{B,C}->D, B fails. C is
/// independent of B and still runs; D depends on the failed B and is
/// recorded as blocked without ever running its command.
#[tokio::test]
async fn s2b_diamond_runs_independent_branch_when_sibling_fails() {
    let runner = Arc::new(FailingBranchRunner { fail_steps: vec!["B".to_string()], calls: Mutex::new(Vec::new()) });
    let engine = WorkflowEngine::new(runner.clone());
    let wf = workflow(
        "s2b-diamond-failure",
        vec![
            WorkflowStep::new("A", StepType::Task),
            WorkflowStep::new("B", StepType::Task).with_depends_on(["A"]),
            WorkflowStep::new("C", StepType::Task).with_depends_on(["A"]),
            WorkflowStep::new("D", StepType::Task).with_depends_on(["B", "C"]),
        ],
    );

    let result = engine.start(wf, HashMap::new()).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.step_results.len(), 4);

    let calls = runner.calls.lock().unwrap();
    assert!(calls.contains(&"A".to_string()));
    assert!(calls.contains(&"B".to_string()));
    assert!(calls.contains(&"C".to_string()));
    assert!(!calls.contains(&"D".to_string()));

    let d = result.step_results.iter().find(|r| r.step_id == "D").unwrap();
    assert_eq!(d.status, StepStatus::Failed);
    assert!(d.skipped);
}

struct FlakyRunner {
    attempts: AtomicU32,
    fail_until: u32,
}

#[async_trait]
impl StepRunner for FlakyRunner {
    async fn run_step(&self, _step: &WorkflowStep, _ctx: &WorkflowContext) -> Result<Value, String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_until {
            Err("TimeoutException".to_string())
        } else {
            Ok(Value::from("ok"))
        }
    }
}

/// S3 — retry success. Fails twice, then succeeds on the third attempt.
#[tokio::test]
async fn s3_retry_succeeds_on_third_attempt() {
    let runner = Arc::new(FlakyRunner { attempts: AtomicU32::new(0), fail_until: 2 });
    let engine = WorkflowEngine::new(runner);

    let policy = RetryPolicy {
        max_retry_count: 3,
        base_delay_ms: 10,
        max_delay_ms: 1000,
        backoff_multiplier: 1.0,
        retryable_exceptions: Vec::new(),
        retry_condition: None,
    };

    let wf = workflow("s3-retry-success", vec![WorkflowStep::new("flaky", StepType::Task).with_retry_policy(policy)]);

    let started = std::time::Instant::now();
    let result = engine.start(wf, HashMap::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.step_results.len(), 1);
    assert_eq!(result.step_results[0].status, StepStatus::Completed);
    assert_eq!(result.step_results[0].total_attempts, 3);
    assert!(elapsed >= Duration::from_millis(20), "two retry delays of >=10ms should have elapsed");
}

struct AlwaysFailsRunner;

#[async_trait]
impl StepRunner for AlwaysFailsRunner {
    async fn run_step(&self, _step: &WorkflowStep, _ctx: &WorkflowContext) -> Result<Value, String> {
        Err("TimeoutException".to_string())
    }
}

/// S4 — retry exhaustion. Delegate always fails; maxRetryCount = 2 means 3 total attempts.
#[tokio::test]
async fn s4_retry_exhaustion_fails_workflow() {
    let runner = Arc::new(AlwaysFailsRunner);
    let engine = WorkflowEngine::new(runner);

    let policy = RetryPolicy {
        max_retry_count: 2,
        base_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 1.0,
        retryable_exceptions: Vec::new(),
        retry_condition: None,
    };

    let wf = workflow("s4-retry-exhaustion", vec![WorkflowStep::new("doomed", StepType::Task).with_retry_policy(policy)]);

    let result = engine.start(wf, HashMap::new()).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.step_results.len(), 1);
    let step_result = &result.step_results[0];
    assert_eq!(step_result.status, StepStatus::Failed);
    assert_eq!(step_result.total_attempts, 3);
    assert!(step_result.all_attempts_failed);
}

/// S5 — missing dependency. This implementation rejects unknown `depends_on`
/// targets at validation time (the defensive variant from the open question),
/// so the workflow never starts.
#[tokio::test]
async fn s5_unknown_dependency_rejected_at_validation() {
    let runner = Arc::new(EchoRunner::new());
    let engine = WorkflowEngine::new(runner);
    let wf = workflow(
        "s5-missing-dependency",
        vec![
            WorkflowStep::new("A", StepType::Task),
            WorkflowStep::new("B", StepType::Task).with_depends_on(["ghost"]),
        ],
    );

    let err = engine.start(wf, HashMap::new()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ValidationFailed(_)));
}

// S6 (pause/resume, with `_pausedAt`/`_resumedAt`/`_totalPauseDuration`
// assertions) lives in `workflow_engine.rs`'s own test module as
// `pause_resume_records_total_pause_duration`: pausing an in-flight
// execution requires the execution id, which `WorkflowEngine` only exposes
// through its private `executions` map, not through any public API.
