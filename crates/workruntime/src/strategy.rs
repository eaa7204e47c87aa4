//! Error-handling strategy resolution.
//!
//! The resolver is pure: it maps a failure signal and the attempt count to
//! an [`Action`]. The engine carries the action out.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use workcore::{AbortReason, FailureSignal, HandlingStrategy, ProcessFault, Results, WorkItem};

/// Bounded retry budget with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total executions allowed for one item, first attempt included
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            ..Self::default()
        }
    }

    /// Budget with a floor of one attempt
    pub fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt that follows `attempts` completed executions.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let millis = (self.delay_ms as f64 * multiplier.powi(exponent)).min(self.max_delay_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

/// What happens to a `Retry` signal once the budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryExhaustion {
    /// Escalate with `ProcessCallback::fail`
    #[default]
    FailProcess,
    /// Abort only the item with `ProcessCallback::abort`
    AbortItem,
}

/// Decision produced for a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Retry { next_attempt: u32, delay: Duration },
    AbortItem(AbortReason),
    AbortProcess(ProcessFault),
    Propagate(ProcessFault),
    CompleteWithError(Results),
}

#[derive(Debug, Clone, Default)]
pub struct StrategyResolver {
    retry: RetryPolicy,
    on_exhausted: RetryExhaustion,
}

impl StrategyResolver {
    pub fn new(retry: RetryPolicy, on_exhausted: RetryExhaustion) -> Self {
        Self { retry, on_exhausted }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Decide what to do after `attempts` executions of `item` ended in `signal`.
    pub fn resolve(&self, item: &WorkItem, attempts: u32, signal: FailureSignal) -> Action {
        match signal.strategy {
            HandlingStrategy::Retry if attempts < self.retry.budget() => {
                let delay = self.retry.delay_after(attempts);
                tracing::debug!(
                    work_item_id = %item.id,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retry granted"
                );
                Action::Retry {
                    next_attempt: attempts + 1,
                    delay,
                }
            }
            HandlingStrategy::Retry => {
                tracing::warn!(
                    work_item_id = %item.id,
                    attempts,
                    "Retry budget exhausted: {}",
                    signal
                );
                match self.on_exhausted {
                    RetryExhaustion::FailProcess => {
                        Action::AbortProcess(ProcessFault::retry_budget_exceeded(signal, attempts))
                    }
                    RetryExhaustion::AbortItem => {
                        Action::AbortItem(AbortReason::RetryBudgetExceeded { attempts, signal })
                    }
                }
            }
            HandlingStrategy::Abort => Action::AbortItem(AbortReason::Declared { signal }),
            HandlingStrategy::Rethrow => Action::Propagate(ProcessFault::rethrown(signal, attempts)),
            HandlingStrategy::CompleteWithErrorResult => {
                Action::CompleteWithError(signal.error_results())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use workcore::{FaultKind, ERROR_RESULT_KEY};

    fn item() -> WorkItem {
        WorkItem::new("flaky", Uuid::new_v4())
    }

    #[test]
    fn retry_is_granted_until_budget_is_spent() {
        let resolver = StrategyResolver::new(RetryPolicy::new(3, 10), RetryExhaustion::FailProcess);
        let item = item();

        for attempts in 1..3 {
            match resolver.resolve(&item, attempts, FailureSignal::retry("busy", "try later")) {
                Action::Retry { next_attempt, .. } => assert_eq!(next_attempt, attempts + 1),
                other => panic!("expected retry, got {:?}", other),
            }
        }

        match resolver.resolve(&item, 3, FailureSignal::retry("busy", "try later")) {
            Action::AbortProcess(fault) => {
                assert_eq!(fault.kind, FaultKind::RetryBudgetExceeded);
                assert_eq!(fault.attempts, 3);
                assert_eq!(fault.code(), "busy");
            }
            other => panic!("expected abort process, got {:?}", other),
        }
    }

    #[test]
    fn exhaustion_can_abort_only_the_item() {
        let resolver = StrategyResolver::new(RetryPolicy::new(1, 0), RetryExhaustion::AbortItem);
        let action = resolver.resolve(&item(), 1, FailureSignal::retry("busy", "again"));
        assert!(matches!(
            action,
            Action::AbortItem(AbortReason::RetryBudgetExceeded { attempts: 1, .. })
        ));
    }

    #[test]
    fn zero_budget_still_allows_one_attempt() {
        let resolver = StrategyResolver::new(RetryPolicy::new(0, 0), RetryExhaustion::FailProcess);
        let action = resolver.resolve(&item(), 1, FailureSignal::retry("busy", "again"));
        assert!(matches!(action, Action::AbortProcess(_)));
    }

    #[test]
    fn declared_strategies_map_one_to_one() {
        let resolver = StrategyResolver::default();
        let item = item();

        assert!(matches!(
            resolver.resolve(&item, 1, FailureSignal::abort("bad_input", "no")),
            Action::AbortItem(AbortReason::Declared { .. })
        ));

        match resolver.resolve(&item, 1, FailureSignal::rethrow("error_handling", "boom")) {
            Action::Propagate(fault) => {
                assert_eq!(fault.kind, FaultKind::Rethrown);
                assert_eq!(fault.code(), "error_handling");
            }
            other => panic!("expected propagate, got {:?}", other),
        }

        match resolver.resolve(&item, 1, FailureSignal::complete_with_error("limit", "over")) {
            Action::CompleteWithError(results) => assert!(results.contains_key(ERROR_RESULT_KEY)),
            other => panic!("expected completion with error, got {:?}", other),
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 500,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }
}
