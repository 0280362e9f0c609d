use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-agent circuit breaker, guarding against cycling an unreliable agent
/// between `Busy` and `Idle` forever.
///
/// This complements (does not replace) the step-level retry executor: the
/// retry executor bounds *one step's* attempts, while this bounds how many
/// times *one agent* is allowed to come back for more work before the
/// registry drives it to `Error` and waits for manual recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    failure_thresholds: HashMap<FailureType, u32>,
    failure_counts: HashMap<FailureType, u32>,
    state: CircuitState,
    last_failure: Option<chrono::DateTime<chrono::Utc>>,
}

/// Categories of agent failure. Different categories imply different
/// responses: a capability mismatch should reassign immediately rather than
/// count against the breaker, while a logic error should accumulate toward
/// quarantine.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureType {
    /// The agent's adapter rejected the task outright.
    CapabilityMismatch,
    /// The executor adapter timed out or was cancelled.
    Timeout,
    /// The step delegate raised a `StepExecutionFailed` after exhausting retries.
    LogicError,
    /// The underlying transport/process failed; likely transient.
    Environmental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        let mut failure_thresholds = HashMap::new();
        failure_thresholds.insert(FailureType::CapabilityMismatch, 1);
        failure_thresholds.insert(FailureType::Timeout, 3);
        failure_thresholds.insert(FailureType::LogicError, 3);
        failure_thresholds.insert(FailureType::Environmental, 5);

        Self {
            failure_thresholds,
            failure_counts: HashMap::new(),
            state: CircuitState::Closed,
            last_failure: None,
        }
    }
}

impl CircuitBreaker {
    pub fn new(failure_thresholds: HashMap<FailureType, u32>) -> Self {
        Self {
            failure_thresholds,
            failure_counts: HashMap::new(),
            state: CircuitState::Closed,
            last_failure: None,
        }
    }

    /// Record a failure, returning the action the agent registry should take.
    pub fn record_failure(&mut self, failure_type: FailureType) -> CircuitBreakerAction {
        self.last_failure = Some(chrono::Utc::now());

        let count = self.failure_counts.entry(failure_type).or_insert(0);
        *count += 1;
        let current_count = *count;

        let threshold = self.failure_thresholds.get(&failure_type).copied().unwrap_or(3);

        if current_count >= threshold {
            self.state = CircuitState::Open;
            CircuitBreakerAction::Quarantine {
                reason: format!("{current_count} {failure_type:?} failures reached threshold {threshold}"),
            }
        } else {
            CircuitBreakerAction::Retry
        }
    }

    pub fn record_success(&mut self) {
        self.failure_counts.clear();
        self.state = CircuitState::Closed;
        self.last_failure = None;
    }

    pub fn can_attempt(&self) -> bool {
        !matches!(self.state, CircuitState::Open)
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Attempt to transition `Open` back to `HalfOpen` for a retry, allowed
    /// automatically once an hour has elapsed since the last failure.
    pub fn try_half_open(&mut self) -> bool {
        if self.state != CircuitState::Open {
            return false;
        }
        if let Some(last) = self.last_failure {
            if chrono::Utc::now() - last >= chrono::Duration::hours(1) {
                self.state = CircuitState::HalfOpen;
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CircuitBreakerAction {
    Retry,
    Quarantine { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_attempt());
    }

    #[test]
    fn capability_mismatch_quarantines_immediately() {
        let mut cb = CircuitBreaker::default();
        let action = cb.record_failure(FailureType::CapabilityMismatch);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(action, CircuitBreakerAction::Quarantine { .. }));
    }

    #[test]
    fn logic_error_accumulates_before_opening() {
        let mut cb = CircuitBreaker::default();
        assert_eq!(cb.record_failure(FailureType::LogicError), CircuitBreakerAction::Retry);
        assert_eq!(cb.record_failure(FailureType::LogicError), CircuitBreakerAction::Retry);
        assert_eq!(cb.state(), CircuitState::Closed);
        let action = cb.record_failure(FailureType::LogicError);
        assert!(matches!(action, CircuitBreakerAction::Quarantine { .. }));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_counts_and_state() {
        let mut cb = CircuitBreaker::default();
        cb.record_failure(FailureType::LogicError);
        cb.record_failure(FailureType::LogicError);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.failure_counts.is_empty());
    }
}
