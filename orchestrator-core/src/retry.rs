use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{
    dispatcher::CancellationToken,
    error::{OrchestratorError, Result},
    evaluator::ExpressionEvaluator,
    models::{RetryPolicy, WorkflowContext},
};

/// Outcome of one delegate invocation, recorded for the caller's step result.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Attempt {
    pub attempt_number: u32,
    pub succeeded: bool,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// Delay scheduled before the next attempt, if one was scheduled.
    pub scheduled_delay_ms: Option<u64>,
}

/// Result of running a delegate under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub attempts: Vec<Attempt>,
    pub total_elapsed_ms: u64,
}

impl<T> RetryOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Drives a fallible async delegate through a bounded retry policy with
/// exponential backoff, honoring cancellation and an optional
/// retry-condition expression that can veto a retry even when attempts
/// remain.
pub struct RetryExecutor;

impl RetryExecutor {
    /// Runs `delegate` up to `policy.max_retry_count + 1` times.
    ///
    /// `delegate` receives the 1-indexed attempt number and returns
    /// `Ok(T)` on success or `Err(String)` carrying a human-readable failure
    /// reason. A reason matching `retry_condition` (evaluated against
    /// `ctx.variables` with `$exception_type`/`$exception_message` bound to
    /// the failure reason) or, absent a condition, any reason at all, is
    /// retried; a reason matching none of `retryable_exceptions` (when that
    /// list is non-empty) short-circuits to failure without consuming
    /// further attempts.
    pub async fn run<T, F, Fut>(
        policy: &RetryPolicy,
        ctx: &WorkflowContext,
        mut delegate: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, String>>,
    {
        let started = Instant::now();
        let mut attempts = Vec::new();
        let max_attempts = policy.max_retry_count + 1;

        for attempt_number in 1..=max_attempts {
            if ctx.cancellation.is_cancelled() {
                return Err(OrchestratorError::Cancelled(format!(
                    "execution {} cancelled before attempt {attempt_number}",
                    ctx.execution_id
                )));
            }

            let attempt_started = Instant::now();
            let outcome = delegate(attempt_number).await;
            let execution_time_ms = attempt_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(value) => {
                    attempts.push(Attempt {
                        attempt_number,
                        succeeded: true,
                        error: None,
                        execution_time_ms,
                        scheduled_delay_ms: None,
                    });
                    return Ok(RetryOutcome {
                        value: Some(value),
                        attempts,
                        total_elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(reason) => {
                    warn!(attempt = attempt_number, error = %reason, "step attempt failed");

                    let retryable = Self::is_retryable(policy, ctx, &reason)?;
                    let scheduled_delay_ms = if retryable && attempt_number < max_attempts {
                        Some(policy.delay_for_attempt(attempt_number))
                    } else {
                        None
                    };

                    attempts.push(Attempt {
                        attempt_number,
                        succeeded: false,
                        error: Some(reason),
                        execution_time_ms,
                        scheduled_delay_ms,
                    });

                    if !retryable {
                        debug!("failure not retryable, stopping early");
                        break;
                    }

                    if let Some(delay_ms) = scheduled_delay_ms {
                        if delay_ms > 0 {
                            let completed =
                                ctx.cancellation.sleep_or_cancel(Duration::from_millis(delay_ms)).await;
                            if !completed {
                                return Err(OrchestratorError::Cancelled(format!(
                                    "execution {} cancelled during retry backoff",
                                    ctx.execution_id
                                )));
                            }
                        }
                    }
                }
            }
        }

        Ok(RetryOutcome { value: None, attempts, total_elapsed_ms: started.elapsed().as_millis() as u64 })
    }

    fn is_retryable(policy: &RetryPolicy, ctx: &WorkflowContext, reason: &str) -> Result<bool> {
        if !policy.retryable_exceptions.is_empty()
            && !policy.retryable_exceptions.iter().any(|e| reason.contains(e.as_str()))
        {
            return Ok(false);
        }

        if let Some(condition) = &policy.retry_condition {
            let mut vars = ctx.variables.clone();
            vars.insert("exception_type".to_string(), serde_json::Value::from(reason));
            vars.insert("exception_message".to_string(), serde_json::Value::from(reason));
            return ExpressionEvaluator::evaluate_bool(condition, &vars);
        }

        Ok(true)
    }
}
