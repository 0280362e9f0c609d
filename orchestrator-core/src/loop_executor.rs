use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{OrchestratorError, Result},
    evaluator::ExpressionEvaluator,
    models::{LoopDefinition, LoopType, WorkflowContext},
};

/// One executed iteration of a loop step, as recorded for the caller.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub index: u32,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Outcome of running a loop header to completion.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// All planned iterations ran; `Retry` loops additionally reached a
    /// successful iteration.
    Completed { iterations: Vec<IterationResult> },
    /// `max_iterations` was hit before the loop's natural end condition.
    /// Per the engine's loop semantics this is a distinct non-failure
    /// terminal state, not a step failure.
    MaxIterationsReached { iterations: Vec<IterationResult> },
}

impl LoopOutcome {
    pub fn iterations(&self) -> &[IterationResult] {
        match self {
            Self::Completed { iterations } | Self::MaxIterationsReached { iterations } => iterations,
        }
    }
}

/// Executes `ForEach`, `While`, and `Retry` loop headers against a workflow
/// step body.
pub struct LoopExecutor;

impl LoopExecutor {
    /// Runs `body` once per iteration as dictated by `loop_def`.
    ///
    /// `body` receives `(index, &mut WorkflowContext)` with the loop's
    /// iterator/index variables already bound into the context, and returns
    /// `Ok(())` on a successful iteration or `Err(String)` on failure.
    pub async fn run<F, Fut>(
        loop_def: &LoopDefinition,
        ctx: &mut WorkflowContext,
        mut body: F,
    ) -> Result<LoopOutcome>
    where
        F: FnMut(u32, &mut WorkflowContext) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), String>>,
    {
        match loop_def.loop_type {
            LoopType::ForEach => Self::run_for_each(loop_def, ctx, body).await,
            LoopType::While => Self::run_while(loop_def, ctx, body).await,
            LoopType::Retry => Self::run_retry(loop_def, ctx, &mut body).await,
        }
    }

    async fn run_for_each<F, Fut>(
        loop_def: &LoopDefinition,
        ctx: &mut WorkflowContext,
        mut body: F,
    ) -> Result<LoopOutcome>
    where
        F: FnMut(u32, &mut WorkflowContext) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), String>>,
    {
        let collection_name = loop_def
            .collection
            .as_ref()
            .ok_or_else(|| OrchestratorError::ValidationFailed("ForEach loop requires a collection".to_string()))?;

        // An absent collection completes with zero iterations rather than
        // failing the step: a `ForEach` over "nothing to iterate" is a valid,
        // common outcome, not an error.
        let items = match ctx.get(collection_name) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(OrchestratorError::ValidationFailed(format!(
                    "variable {collection_name} is not an array"
                )))
            }
        };

        let mut iterations = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            if idx as u32 >= loop_def.max_iterations {
                return Ok(LoopOutcome::MaxIterationsReached { iterations });
            }
            if ctx.cancellation.is_cancelled() {
                return Err(OrchestratorError::Cancelled(format!(
                    "execution {} cancelled during loop",
                    ctx.execution_id
                )));
            }

            ctx.set(loop_def.iterator_variable.clone(), item);
            ctx.set(loop_def.index_variable.clone(), Value::from(idx as u64));

            let result = body(idx as u32, ctx).await;
            iterations.push(IterationResult {
                index: idx as u32,
                succeeded: result.is_ok(),
                error: result.err(),
            });
        }

        Ok(LoopOutcome::Completed { iterations })
    }

    async fn run_while<F, Fut>(
        loop_def: &LoopDefinition,
        ctx: &mut WorkflowContext,
        mut body: F,
    ) -> Result<LoopOutcome>
    where
        F: FnMut(u32, &mut WorkflowContext) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), String>>,
    {
        let condition = loop_def
            .condition
            .as_ref()
            .ok_or_else(|| OrchestratorError::ValidationFailed("While loop requires a condition".to_string()))?;

        let mut iterations = Vec::new();
        let mut idx: u32 = 0;

        loop {
            if !ExpressionEvaluator::evaluate_bool(condition, &ctx.variables)? {
                break;
            }
            if idx >= loop_def.max_iterations {
                warn!(execution_id = %ctx.execution_id, "while loop hit max_iterations");
                return Ok(LoopOutcome::MaxIterationsReached { iterations });
            }
            if ctx.cancellation.is_cancelled() {
                return Err(OrchestratorError::Cancelled(format!(
                    "execution {} cancelled during loop",
                    ctx.execution_id
                )));
            }

            ctx.set(loop_def.index_variable.clone(), Value::from(idx as u64));
            let result = body(idx, ctx).await;
            iterations.push(IterationResult { index: idx, succeeded: result.is_ok(), error: result.err() });
            idx += 1;
        }

        Ok(LoopOutcome::Completed { iterations })
    }

    /// Repeats the loop body until it succeeds once, or `max_iterations` is
    /// exhausted. Distinct from the step-level [`crate::retry::RetryExecutor`]:
    /// this retries an entire loop body (potentially several steps), while
    /// the retry executor retries a single step's delegate call.
    async fn run_retry<F, Fut>(
        loop_def: &LoopDefinition,
        ctx: &mut WorkflowContext,
        body: &mut F,
    ) -> Result<LoopOutcome>
    where
        F: FnMut(u32, &mut WorkflowContext) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), String>>,
    {
        let mut iterations = Vec::new();

        for idx in 0..loop_def.max_iterations {
            if ctx.cancellation.is_cancelled() {
                return Err(OrchestratorError::Cancelled(format!(
                    "execution {} cancelled during loop",
                    ctx.execution_id
                )));
            }

            ctx.set(loop_def.index_variable.clone(), Value::from(idx as u64));
            let result = body(idx, ctx).await;
            let succeeded = result.is_ok();
            iterations.push(IterationResult { index: idx, succeeded, error: result.err() });

            if succeeded {
                debug!(attempt = idx, "retry loop succeeded");
                return Ok(LoopOutcome::Completed { iterations });
            }
        }

        Ok(LoopOutcome::MaxIterationsReached { iterations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn for_each(collection: &str) -> LoopDefinition {
        LoopDefinition {
            loop_type: LoopType::ForEach,
            collection: Some(collection.to_string()),
            condition: None,
            iterator_variable: "item".to_string(),
            index_variable: "index".to_string(),
            max_iterations: 1000,
        }
    }

    #[tokio::test]
    async fn for_each_binds_item_and_index() {
        let mut ctx = WorkflowContext::new("exec-1".to_string());
        ctx.set("items", json!(["a", "b", "c"]));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let outcome = LoopExecutor::run(&for_each("items"), &mut ctx, |idx, ctx| {
            let seen = seen.clone();
            let item = ctx.get("item").cloned();
            async move {
                seen.lock().unwrap().push((idx, item));
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.iterations().len(), 3);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[1].0, 1);
        assert_eq!(seen[1].1, Some(json!("b")));
    }

    #[tokio::test]
    async fn for_each_over_absent_collection_completes_with_zero_iterations() {
        let mut ctx = WorkflowContext::new("exec-1".to_string());
        let outcome = LoopExecutor::run(&for_each("missing"), &mut ctx, |_idx, _ctx| async { Ok(()) }).await.unwrap();

        assert!(matches!(outcome, LoopOutcome::Completed { .. }));
        assert!(outcome.iterations().is_empty());
    }

    #[tokio::test]
    async fn while_loop_stops_at_condition() {
        let mut ctx = WorkflowContext::new("exec-1".to_string());
        ctx.set("remaining", json!(3));
        let loop_def = LoopDefinition {
            loop_type: LoopType::While,
            collection: None,
            condition: Some("{{remaining}} > 0".to_string()),
            iterator_variable: "item".to_string(),
            index_variable: "index".to_string(),
            max_iterations: 1000,
        };

        let outcome = LoopExecutor::run(&loop_def, &mut ctx, |idx, ctx| {
            let remaining = ctx.get("remaining").and_then(Value::as_i64).unwrap_or(0);
            ctx.set("remaining", json!(remaining - 1));
            let _ = idx;
            async { Ok(()) }
        })
        .await
        .unwrap();

        assert_eq!(outcome.iterations().len(), 3);
        assert!(matches!(outcome, LoopOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn while_loop_hits_max_iterations_without_failing() {
        let mut ctx = WorkflowContext::new("exec-1".to_string());
        let loop_def = LoopDefinition {
            loop_type: LoopType::While,
            collection: None,
            condition: Some("true".to_string()),
            iterator_variable: "item".to_string(),
            index_variable: "index".to_string(),
            max_iterations: 5,
        };

        let outcome = LoopExecutor::run(&loop_def, &mut ctx, |_idx, _ctx| async { Ok(()) }).await.unwrap();
        assert!(matches!(outcome, LoopOutcome::MaxIterationsReached { .. }));
        assert_eq!(outcome.iterations().len(), 5);
    }

    #[tokio::test]
    async fn retry_loop_stops_at_first_success() {
        let mut ctx = WorkflowContext::new("exec-1".to_string());
        let loop_def = LoopDefinition {
            loop_type: LoopType::Retry,
            collection: None,
            condition: None,
            iterator_variable: "item".to_string(),
            index_variable: "index".to_string(),
            max_iterations: 10,
        };

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let outcome = LoopExecutor::run(&loop_def, &mut ctx, move |_idx, _ctx| {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.iterations().len(), 3);
        assert!(matches!(outcome, LoopOutcome::Completed { .. }));
    }
}
