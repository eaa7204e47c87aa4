use crate::{HandlerError, Results, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Code carried by signals synthesized from undeclared handler faults.
pub const HANDLER_FAULT_CODE: &str = "handler_fault";

/// Code carried by signals synthesized from attempt timeouts.
pub const TIMEOUT_CODE: &str = "timeout";

/// Result key holding the error marker for `CompleteWithErrorResult`.
pub const ERROR_RESULT_KEY: &str = "error";

/// How the engine must react when a handler fails. Chosen by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlingStrategy {
    /// Abort the work item; the process decides whether it can go on.
    Abort,
    /// Raise a process-level fault.
    Rethrow,
    /// Invoke the handler again, within the retry budget.
    Retry,
    /// Complete the item with an error marker in its results.
    CompleteWithErrorResult,
}

/// Structured failure declared by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct FailureSignal {
    pub code: String,
    pub message: String,
    pub strategy: HandlingStrategy,
    pub cause: Option<String>,
}

impl FailureSignal {
    pub fn new(
        code: impl Into<String>,
        strategy: HandlingStrategy,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            strategy,
            cause: None,
        }
    }

    pub fn abort(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, HandlingStrategy::Abort, message)
    }

    pub fn rethrow(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, HandlingStrategy::Rethrow, message)
    }

    pub fn retry(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, HandlingStrategy::Retry, message)
    }

    pub fn complete_with_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, HandlingStrategy::CompleteWithErrorResult, message)
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Results mapping used when the strategy is `CompleteWithErrorResult`.
    pub fn error_results(&self) -> Results {
        let mut marker = HashMap::new();
        marker.insert("code".to_string(), Value::from(self.code.as_str()));
        marker.insert("message".to_string(), Value::from(self.message.as_str()));

        let mut results = Results::new();
        results.insert(ERROR_RESULT_KEY.to_string(), Value::Object(marker));
        results
    }
}

impl From<HandlerError> for FailureSignal {
    fn from(error: HandlerError) -> Self {
        let code = match error {
            HandlerError::Timeout { .. } => TIMEOUT_CODE,
            _ => HANDLER_FAULT_CODE,
        };
        FailureSignal::rethrow(code, error.to_string())
    }
}

/// What a handler invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Completed(Results),
    Failed(FailureSignal),
}

impl HandlerOutcome {
    pub fn completed(results: Results) -> Self {
        HandlerOutcome::Completed(results)
    }

    pub fn failed(signal: FailureSignal) -> Self {
        HandlerOutcome::Failed(signal)
    }
}

impl From<Result<Results, FailureSignal>> for HandlerOutcome {
    fn from(result: Result<Results, FailureSignal>) -> Self {
        match result {
            Ok(results) => HandlerOutcome::Completed(results),
            Err(signal) => HandlerOutcome::Failed(signal),
        }
    }
}

/// Why a work item was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    UnknownHandler { work_item_type: String },
    Declared { signal: FailureSignal },
    RetryBudgetExceeded { attempts: u32, signal: FailureSignal },
    Requested,
}

impl AbortReason {
    /// The handler's signal, when the abort originated from one.
    pub fn signal(&self) -> Option<&FailureSignal> {
        match self {
            AbortReason::Declared { signal } => Some(signal),
            AbortReason::RetryBudgetExceeded { signal, .. } => Some(signal),
            _ => None,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::UnknownHandler { work_item_type } => {
                write!(f, "unknown handler: {}", work_item_type)
            }
            AbortReason::Declared { signal } => write!(f, "aborted by handler: {}", signal),
            AbortReason::RetryBudgetExceeded { attempts, signal } => {
                write!(f, "retry budget exceeded after {} attempts: {}", attempts, signal)
            }
            AbortReason::Requested => write!(f, "abort requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The handler declared `Rethrow`, or faulted without declaring anything.
    Rethrown,
    /// A `Retry` signal ran out of attempts.
    RetryBudgetExceeded,
}

/// Process-level fault delivered through `ProcessCallback::fail`.
///
/// The orchestrating process may catch it at an error boundary keyed on
/// `signal.code`; uncaught, it ends the process instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?} after {attempts} attempt(s): {signal}")]
pub struct ProcessFault {
    pub signal: FailureSignal,
    pub kind: FaultKind,
    pub attempts: u32,
}

impl ProcessFault {
    pub fn rethrown(signal: FailureSignal, attempts: u32) -> Self {
        Self {
            signal,
            kind: FaultKind::Rethrown,
            attempts,
        }
    }

    pub fn retry_budget_exceeded(signal: FailureSignal, attempts: u32) -> Self {
        Self {
            signal,
            kind: FaultKind::RetryBudgetExceeded,
            attempts,
        }
    }

    pub fn code(&self) -> &str {
        &self.signal.code
    }
}
