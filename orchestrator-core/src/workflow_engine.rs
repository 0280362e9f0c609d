use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::{OrchestratorError, Result},
    evaluator::ExpressionEvaluator,
    loop_executor::{LoopExecutor, LoopOutcome},
    models::{
        RetryPolicy, StepResult, StepStatus, StepType, WorkflowContext, WorkflowDefinition,
        WorkflowExecutionResult, WorkflowStatus, WorkflowStep,
    },
    retry::RetryExecutor,
    validation::WorkflowValidator,
};

/// Runs a single `Task`-typed step's command to completion. Distinct from
/// [`crate::dispatcher::AgentExecutor`]: that adapter runs a queued
/// [`crate::models::Task`] on a remote agent, while this runs one workflow
/// step inline, synchronously from the engine's point of view.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, step: &WorkflowStep, ctx: &WorkflowContext) -> std::result::Result<Value, String>;
}

struct ExecutionState {
    definition: WorkflowDefinition,
    context: WorkflowContext,
    order: Vec<String>,
    cursor: usize,
    step_results: Vec<StepResult>,
    status: WorkflowStatus,
    pause_requested: Arc<AtomicBool>,
    error: Option<String>,
    paused_at: Option<chrono::DateTime<Utc>>,
}

/// Validates, plans, and drives workflow executions to completion.
///
/// Execution is step-at-a-time. A step failure does not stop the run: the
/// engine keeps advancing through the topological order, skipping only
/// steps that transitively depend on the failed one (each such step is
/// still recorded in `step_results`, marked failed and skipped, so the
/// record stays complete). The execution as a whole is marked `Failed` once
/// any step genuinely fails, but independent siblings still run to
/// completion. Pausing takes effect at the next step boundary, never
/// mid-step.
pub struct WorkflowEngine<S: StepRunner + ?Sized> {
    runner: Arc<S>,
    executions: RwLock<HashMap<String, ExecutionState>>,
}

impl<S: StepRunner + ?Sized> WorkflowEngine<S> {
    pub fn new(runner: Arc<S>) -> Self {
        Self { runner, executions: RwLock::new(HashMap::new()) }
    }

    pub fn validate(wf: &WorkflowDefinition) -> Result<()> {
        WorkflowValidator::validate(wf)
    }

    /// Validates `wf`, seeds a fresh [`WorkflowContext`] with variable
    /// defaults overridden by `initial_vars`, and runs it to completion,
    /// a pause, or a failure.
    pub async fn start(
        &self,
        wf: WorkflowDefinition,
        initial_vars: HashMap<String, Value>,
    ) -> Result<WorkflowExecutionResult> {
        Self::validate(&wf)?;

        for (name, def) in &wf.variables {
            if def.required && !initial_vars.contains_key(name) && def.default.is_none() {
                return Err(OrchestratorError::RequiredVariableMissing(name.clone()));
            }
        }

        let execution_id = uuid::Uuid::new_v4().to_string();
        let mut context = WorkflowContext::new(execution_id.clone());
        context.set("_executionId".to_string(), Value::String(execution_id.clone()));
        for (name, def) in &wf.variables {
            if let Some(default) = &def.default {
                context.set(name.clone(), default.clone());
            }
        }
        for (name, value) in initial_vars {
            context.set(name, value);
        }

        let order = topological_order(&wf)?;

        let state = ExecutionState {
            definition: wf,
            context,
            order,
            cursor: 0,
            step_results: Vec::new(),
            status: WorkflowStatus::Running,
            pause_requested: Arc::new(AtomicBool::new(false)),
            error: None,
            paused_at: None,
        };

        {
            let mut executions = self.executions.write().await;
            executions.insert(execution_id.clone(), state);
        }

        info!(execution_id = %execution_id, "workflow execution started");
        self.drive(&execution_id).await
    }

    /// Requests a pause, which takes effect at the next step boundary.
    pub async fn pause(&self, execution_id: &str) -> Result<()> {
        let executions = self.executions.read().await;
        let state = executions
            .get(execution_id)
            .ok_or_else(|| OrchestratorError::not_found_id(execution_id))?;
        if !state.status.can_transition_to(WorkflowStatus::Paused) {
            return Err(OrchestratorError::invalid_transition_workflow(state.status, WorkflowStatus::Paused));
        }
        state.pause_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Resumes a paused execution from its stored cursor.
    pub async fn resume(&self, execution_id: &str) -> Result<WorkflowExecutionResult> {
        {
            let mut executions = self.executions.write().await;
            let state = executions
                .get_mut(execution_id)
                .ok_or_else(|| OrchestratorError::not_found_id(execution_id))?;
            if state.status != WorkflowStatus::Paused {
                return Err(OrchestratorError::invalid_transition_workflow(state.status, WorkflowStatus::Running));
            }
            state.status = WorkflowStatus::Running;
            state.pause_requested.store(false, Ordering::SeqCst);

            let now = Utc::now();
            if let Some(paused_at) = state.paused_at.take() {
                let elapsed_ms = (now - paused_at).num_milliseconds().max(0);
                let accumulated = state.context.get("_totalPauseDuration").and_then(Value::as_i64).unwrap_or(0);
                state.context.set("_totalPauseDuration".to_string(), Value::from(accumulated + elapsed_ms));
            }
            state.context.set("_resumedAt".to_string(), Value::String(now.to_rfc3339()));
        }
        self.drive(execution_id).await
    }

    /// Cancels the execution's in-flight and future step attempts.
    pub async fn cancel(&self, execution_id: &str) -> Result<()> {
        let executions = self.executions.read().await;
        let state = executions
            .get(execution_id)
            .ok_or_else(|| OrchestratorError::not_found_id(execution_id))?;
        state.context.cancellation.cancel();
        Ok(())
    }

    pub async fn get_status(&self, execution_id: &str) -> Result<WorkflowExecutionResult> {
        let executions = self.executions.read().await;
        let state = executions
            .get(execution_id)
            .ok_or_else(|| OrchestratorError::not_found_id(execution_id))?;
        Ok(Self::snapshot(state))
    }

    fn snapshot(state: &ExecutionState) -> WorkflowExecutionResult {
        WorkflowExecutionResult {
            execution_id: state.context.execution_id.clone(),
            status: state.status,
            output: state.context.variables.clone(),
            step_results: state.step_results.clone(),
            error: state.error.clone(),
        }
    }

    /// Runs steps from the stored cursor until completion, a pause, or a
    /// failure. Holds the executions lock only to read/write the state
    /// struct itself; step execution runs with the lock released so
    /// concurrent executions never block on each other.
    async fn drive(&self, execution_id: &str) -> Result<WorkflowExecutionResult> {
        loop {
            enum Next {
                Done,
                Paused,
                Step(WorkflowStep),
            }

            let next = {
                let executions = self.executions.read().await;
                let state = executions
                    .get(execution_id)
                    .ok_or_else(|| OrchestratorError::not_found_id(execution_id))?;

                if state.cursor >= state.order.len() {
                    Next::Done
                } else if state.pause_requested.load(Ordering::SeqCst) {
                    Next::Paused
                } else {
                    let step_id = &state.order[state.cursor];
                    let step = state
                        .definition
                        .steps
                        .iter()
                        .find(|s| &s.id == step_id)
                        .expect("order only contains known step ids")
                        .clone();
                    Next::Step(step)
                }
            };

            let step = match next {
                Next::Done => break,
                Next::Paused => {
                    let mut executions = self.executions.write().await;
                    let state = executions.get_mut(execution_id).expect("execution present");
                    let previous_status = state.status.to_string();
                    state.status = WorkflowStatus::Paused;
                    let now = Utc::now();
                    state.paused_at = Some(now);
                    state.context.set("_pausedAt".to_string(), Value::String(now.to_rfc3339()));
                    state.context.set("_previousStatus".to_string(), Value::String(previous_status));
                    info!(execution_id, "workflow paused");
                    return Ok(Self::snapshot(state));
                }
                Next::Step(step) => step,
            };

            let step_result = self.run_one_step(execution_id, &step).await?;

            let mut executions = self.executions.write().await;
            let state = executions.get_mut(execution_id).expect("execution present");

            let failed = step_result.status == StepStatus::Failed && !step_result.skipped;
            if failed {
                warn!(execution_id, step = %step.id, "workflow step failed");
                state.error.get_or_insert_with(|| format!("step {} failed", step.id));
            }
            state.step_results.push(step_result);
            state.cursor += 1;
        }

        let mut executions = self.executions.write().await;
        let state = executions.get_mut(execution_id).expect("execution present");
        let any_failed = state.step_results.iter().any(|r| r.status == StepStatus::Failed && !r.skipped);
        state.status = if any_failed { WorkflowStatus::Failed } else { WorkflowStatus::Completed };
        if any_failed {
            warn!(execution_id, "workflow completed with failed steps");
        } else {
            info!(execution_id, "workflow completed");
        }
        Ok(Self::snapshot(state))
    }

    async fn run_one_step(&self, execution_id: &str, step: &WorkflowStep) -> Result<StepResult> {
        let (ctx_snapshot, dependency_blocked) = {
            let executions = self.executions.read().await;
            let state = executions.get(execution_id).expect("execution present");

            let blocked = step.depends_on.iter().find(|dep| {
                !state
                    .step_results
                    .iter()
                    .any(|r| &r.step_id == *dep && r.status == StepStatus::Completed)
            });
            (state.context.clone(), blocked.cloned())
        };

        if let Some(dep) = dependency_blocked {
            return Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Failed,
                skipped: true,
                reason: Some(format!("dependency {dep} did not complete")),
                output: None,
                error: Some(OrchestratorError::DependencyBlocked(step.id.clone(), dep).to_string()),
                total_attempts: 0,
                all_attempts_failed: false,
                attempts: Vec::new(),
                executed_at: Utc::now(),
            });
        }

        if let Some(condition) = &step.condition {
            if !ExpressionEvaluator::evaluate_bool(condition, &ctx_snapshot.variables)? {
                debug!(step = %step.id, "step condition false, skipping");
                return Ok(StepResult {
                    step_id: step.id.clone(),
                    status: StepStatus::Completed,
                    skipped: true,
                    reason: Some("condition evaluated false".to_string()),
                    output: None,
                    error: None,
                    total_attempts: 0,
                    all_attempts_failed: false,
                    attempts: Vec::new(),
                    executed_at: Utc::now(),
                });
            }
        }

        if matches!(step.step_type, StepType::Start | StepType::End) {
            return Ok(StepResult {
                step_id: step.id.clone(),
                status: StepStatus::Completed,
                skipped: false,
                reason: None,
                output: None,
                error: None,
                total_attempts: 0,
                all_attempts_failed: false,
                attempts: Vec::new(),
                executed_at: Utc::now(),
            });
        }

        if let Some(loop_def) = &step.loop_def {
            let runner = self.runner.clone();
            let mut ctx = ctx_snapshot;
            let result = LoopExecutor::run(loop_def, &mut ctx, |_idx, ctx| {
                let runner = runner.clone();
                let step = step.clone();
                let ctx_ref = ctx.clone();
                async move { runner.run_step(&step, &ctx_ref).await }
            })
            .await?;

            self.merge_context(execution_id, ctx).await;

            let (status, error, all_failed) = match &result {
                LoopOutcome::Completed { iterations } => {
                    let failed = iterations.last().map(|i| !i.succeeded).unwrap_or(false);
                    if failed {
                        (StepStatus::Failed, iterations.last().and_then(|i| i.error.clone()), true)
                    } else {
                        (StepStatus::Completed, None, false)
                    }
                }
                LoopOutcome::MaxIterationsReached { .. } => {
                    (StepStatus::Completed, None, false)
                }
            };

            return Ok(StepResult {
                step_id: step.id.clone(),
                status,
                skipped: false,
                reason: matches!(result, LoopOutcome::MaxIterationsReached { .. })
                    .then(|| "max_iterations reached".to_string()),
                output: None,
                error,
                total_attempts: result.iterations().len() as u32,
                all_attempts_failed: all_failed,
                attempts: Vec::new(),
                executed_at: Utc::now(),
            });
        }

        let policy = step.retry_policy.clone().unwrap_or_else(RetryPolicy::single_attempt);
        let runner = self.runner.clone();
        let step_clone = step.clone();
        let ctx_for_delegate = ctx_snapshot.clone();
        let outcome = RetryExecutor::run(&policy, &ctx_snapshot, move |_n| {
            let runner = runner.clone();
            let step = step_clone.clone();
            let ctx = ctx_for_delegate.clone();
            async move { runner.run_step(&step, &ctx).await }
        })
        .await?;

        let succeeded = outcome.succeeded();
        let total_attempts = outcome.total_attempts();
        let last_error = outcome.attempts.last().and_then(|a| a.error.clone());
        let executed_at = Utc::now();

        if let Some(output) = &outcome.value {
            self.bind_output(execution_id, step, output.clone(), executed_at).await;
        }

        Ok(StepResult {
            step_id: step.id.clone(),
            status: if succeeded { StepStatus::Completed } else { StepStatus::Failed },
            skipped: false,
            reason: None,
            output: outcome.value,
            error: if succeeded { None } else { last_error },
            total_attempts,
            all_attempts_failed: !succeeded,
            attempts: outcome.attempts,
            executed_at,
        })
    }

    /// Binds a completed step's result into the context under its three
    /// namespaced keys so later steps can reference `$<stepId>.result`,
    /// `$<stepId>.parameters`, and `$<stepId>.executedAt`.
    async fn bind_output(
        &self,
        execution_id: &str,
        step: &WorkflowStep,
        value: Value,
        executed_at: chrono::DateTime<Utc>,
    ) {
        let mut executions = self.executions.write().await;
        if let Some(state) = executions.get_mut(execution_id) {
            state.context.set(format!("{}.result", step.id), value);
            state.context.set(
                format!("{}.parameters", step.id),
                Value::Object(step.parameters.clone().into_iter().collect()),
            );
            state
                .context
                .set(format!("{}.executedAt", step.id), Value::String(executed_at.to_rfc3339()));
        }
    }

    async fn merge_context(&self, execution_id: &str, ctx: WorkflowContext) {
        let mut executions = self.executions.write().await;
        if let Some(state) = executions.get_mut(execution_id) {
            state.context.variables = ctx.variables;
        }
    }
}

impl OrchestratorError {
    fn invalid_transition_workflow(from: WorkflowStatus, to: WorkflowStatus) -> Self {
        Self::IllegalTransition(from.to_string(), to.to_string())
    }
}

/// Kahn's algorithm topological sort. Assumes `wf` already passed
/// [`WorkflowValidator::validate`]; re-detects cycles defensively since the
/// engine must never silently skip a step in an execution whose validity it
/// did not itself just check.
fn topological_order(wf: &WorkflowDefinition) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = wf.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in &wf.steps {
        for dep in &step.depends_on {
            *in_degree.get_mut(step.id.as_str()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = wf
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(wf.steps.len());
    let mut visited = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        order.push(id.to_string());

        if let Some(children) = dependents.get(id) {
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if order.len() != wf.steps.len() {
        return Err(OrchestratorError::ValidationFailed(
            "workflow graph contains a cycle".to_string(),
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowMetadata;
    use std::sync::Mutex;

    struct EchoRunner {
        calls: Mutex<Vec<String>>,
        fail_steps: Vec<String>,
    }

    #[async_trait]
    impl StepRunner for EchoRunner {
        async fn run_step(&self, step: &WorkflowStep, _ctx: &WorkflowContext) -> std::result::Result<Value, String> {
            self.calls.lock().unwrap().push(step.id.clone());
            if self.fail_steps.contains(&step.id) {
                Err(format!("{} failed", step.id))
            } else {
                Ok(Value::from(step.id.clone()))
            }
        }
    }

    fn wf(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-1".to_string(),
            name: "test".to_string(),
            steps,
            variables: Default::default(),
            metadata: WorkflowMetadata::default(),
        }
    }

    #[tokio::test]
    async fn topological_order_respects_dependencies() {
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("c", StepType::Task).with_depends_on(["a", "b"]),
        ]);
        let order = topological_order(&w).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn runs_linear_workflow_to_completion() {
        let runner = Arc::new(EchoRunner { calls: Mutex::new(Vec::new()), fail_steps: Vec::new() });
        let engine = WorkflowEngine::new(runner.clone());
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
        ]);

        let result = engine.start(w, HashMap::new()).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(*runner.calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn step_failure_blocks_downstream_and_stops_workflow() {
        let runner = Arc::new(EchoRunner { calls: Mutex::new(Vec::new()), fail_steps: vec!["a".to_string()] });
        let engine = WorkflowEngine::new(runner.clone());
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
        ]);

        let result = engine.start(w, HashMap::new()).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        // "b" still gets a recorded (blocked) result rather than being
        // silently absent from step_results.
        assert_eq!(result.step_results.len(), 2);
        assert!(result.step_results[1].skipped);
        assert_eq!(*runner.calls.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn independent_sibling_still_runs_when_a_diamond_branch_fails() {
        let runner = Arc::new(EchoRunner { calls: Mutex::new(Vec::new()), fail_steps: vec!["b".to_string()] });
        let engine = WorkflowEngine::new(runner.clone());
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("c", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("d", StepType::Task).with_depends_on(["b", "c"]),
        ]);

        let result = engine.start(w, HashMap::new()).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.step_results.len(), 4);

        let calls = runner.calls.lock().unwrap();
        assert!(calls.contains(&"a".to_string()));
        assert!(calls.contains(&"b".to_string()));
        // "c" is independent of the failed "b" and still runs.
        assert!(calls.contains(&"c".to_string()));
        // "d" depends on "b" (failed), so it never actually runs.
        assert!(!calls.contains(&"d".to_string()));

        let d_result = result.step_results.iter().find(|r| r.step_id == "d").unwrap();
        assert!(d_result.skipped);
        assert_eq!(d_result.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn condition_false_skips_step_without_failing_workflow() {
        let runner = Arc::new(EchoRunner { calls: Mutex::new(Vec::new()), fail_steps: Vec::new() });
        let engine = WorkflowEngine::new(runner.clone());
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task).with_condition("false"),
        ]);

        let result = engine.start(w, HashMap::new()).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert!(result.step_results[0].skipped);
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_required_variable_rejected_before_execution() {
        let runner = Arc::new(EchoRunner { calls: Mutex::new(Vec::new()), fail_steps: Vec::new() });
        let engine = WorkflowEngine::new(runner);
        let mut w = wf(vec![WorkflowStep::new("a", StepType::Task)]);
        w.variables.insert(
            "target".to_string(),
            crate::models::VariableDefinition {
                name: "target".to_string(),
                var_type: crate::models::VariableType::String,
                default: None,
                required: true,
                description: None,
            },
        );

        let err = engine.start(w, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RequiredVariableMissing(_)));
    }

    struct SlowRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepRunner for SlowRunner {
        async fn run_step(&self, step: &WorkflowStep, _ctx: &WorkflowContext) -> std::result::Result<Value, String> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.calls.lock().unwrap().push(step.id.clone());
            Ok(Value::from(step.id.clone()))
        }
    }

    #[tokio::test]
    async fn pause_then_resume_continues_from_cursor() {
        let runner = Arc::new(SlowRunner { calls: Mutex::new(Vec::new()) });
        let engine = Arc::new(WorkflowEngine::new(runner));
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
        ]);

        let run_engine = engine.clone();
        let handle = tokio::spawn(async move { run_engine.start(w, HashMap::new()).await });

        // Give step "a" time to start, then request a pause before "b" runs.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // execution id isn't known yet from outside; poll the registry instead.
        let execution_id = loop {
            let executions = engine.executions.read().await;
            if let Some((id, _)) = executions.iter().next() {
                break id.clone();
            }
            drop(executions);
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        };
        engine.pause(&execution_id).await.unwrap();

        let paused_result = handle.await.unwrap().unwrap();
        assert_eq!(paused_result.status, WorkflowStatus::Paused);
        assert_eq!(paused_result.step_results.len(), 1);

        let resumed = engine.resume(&execution_id).await.unwrap();
        assert_eq!(resumed.status, WorkflowStatus::Completed);
        assert_eq!(resumed.step_results.len(), 2);
    }

    #[tokio::test]
    async fn pause_resume_records_total_pause_duration() {
        let runner = Arc::new(SlowRunner { calls: Mutex::new(Vec::new()) });
        let engine = Arc::new(WorkflowEngine::new(runner));
        let w = wf(vec![
            WorkflowStep::new("a", StepType::Task),
            WorkflowStep::new("b", StepType::Task).with_depends_on(["a"]),
            WorkflowStep::new("c", StepType::Task).with_depends_on(["b"]),
        ]);

        let run_engine = engine.clone();
        let handle = tokio::spawn(async move { run_engine.start(w, HashMap::new()).await });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let execution_id = loop {
            let executions = engine.executions.read().await;
            if let Some((id, _)) = executions.iter().next() {
                break id.clone();
            }
            drop(executions);
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        };
        engine.pause(&execution_id).await.unwrap();

        let paused_result = handle.await.unwrap().unwrap();
        assert_eq!(paused_result.status, WorkflowStatus::Paused);
        assert!(paused_result.output.contains_key("_pausedAt"));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let resumed = engine.resume(&execution_id).await.unwrap();
        assert_eq!(resumed.status, WorkflowStatus::Completed);
        assert_eq!(resumed.step_results.len(), 3);
        assert!(resumed.output.contains_key("_resumedAt"));
        let pause_duration = resumed.output.get("_totalPauseDuration").and_then(Value::as_i64).unwrap();
        assert!(pause_duration >= 50, "expected paused duration >= 50ms, got {pause_duration}");
    }
}
