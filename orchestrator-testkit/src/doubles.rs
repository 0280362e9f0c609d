//! Scripted test doubles for the dispatcher and workflow engine seams.
//!
//! [`ScriptedAgentExecutor`] and [`ScriptedStepRunner`] let a test pin down
//! exactly what an agent/step returns without spinning up a real process,
//! while still recording what they were called with.

use std::collections::VecDeque;

use async_trait::async_trait;
use orchestrator_core::{
    dispatcher::{AgentContext, AgentExecutor, ExecutionOutcome},
    models::{Task, WorkflowContext, WorkflowStep},
    workflow_engine::StepRunner,
};
use parking_lot::Mutex;
use serde_json::Value;

/// An [`AgentExecutor`] whose outcomes are scripted in advance.
///
/// Outcomes are consumed in FIFO order; once exhausted, further calls repeat
/// the last outcome given (or `Success("")` if none was ever given).
pub struct ScriptedAgentExecutor {
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    last: Mutex<Option<ExecutionOutcome>>,
    calls: Mutex<Vec<Task>>,
}

impl Default for ScriptedAgentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgentExecutor {
    pub fn new() -> Self {
        Self { outcomes: Mutex::new(VecDeque::new()), last: Mutex::new(None), calls: Mutex::new(Vec::new()) }
    }

    /// An executor that always succeeds with `result`.
    pub fn always_succeeds(result: impl Into<String>) -> Self {
        let executor = Self::new();
        *executor.last.lock() = Some(ExecutionOutcome::Success(result.into()));
        executor
    }

    /// An executor that always fails with `error`.
    pub fn always_fails(error: impl Into<String>) -> Self {
        let executor = Self::new();
        *executor.last.lock() = Some(ExecutionOutcome::Failure(error.into()));
        executor
    }

    /// Queues `outcome` to be returned by the next call.
    pub fn push_outcome(&self, outcome: ExecutionOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<Task> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedAgentExecutor {
    async fn execute(&self, task: &Task, _agent_ctx: &AgentContext) -> ExecutionOutcome {
        self.calls.lock().push(task.clone());

        if let Some(outcome) = self.outcomes.lock().pop_front() {
            *self.last.lock() = Some(outcome.clone());
            return outcome;
        }

        self.last.lock().clone().unwrap_or_else(|| ExecutionOutcome::Success(String::new()))
    }
}

/// A [`StepRunner`] whose results are scripted per step id.
///
/// Falls back to `Ok(Value::Null)` for any step id without a scripted
/// result, so tests only need to pin down the steps they care about.
pub struct ScriptedStepRunner {
    results: Mutex<std::collections::HashMap<String, Result<Value, String>>>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedStepRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStepRunner {
    pub fn new() -> Self {
        Self { results: Mutex::new(std::collections::HashMap::new()), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_result(self, step_id: impl Into<String>, result: Result<Value, String>) -> Self {
        self.results.lock().insert(step_id.into(), result);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl StepRunner for ScriptedStepRunner {
    async fn run_step(&self, step: &WorkflowStep, _ctx: &WorkflowContext) -> Result<Value, String> {
        self.calls.lock().push(step.id.clone());
        match self.results.lock().get(&step.id) {
            Some(result) => result.clone(),
            None => Ok(Value::Null),
        }
    }
}
