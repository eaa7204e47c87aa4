use crate::work_item::{WorkItemId, WorkItemState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Work item error: {0}")]
    WorkItem(#[from] WorkItemError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Work item {0} is already in flight")]
    AlreadyActive(WorkItemId),

    #[error("Work item {0} is not in flight")]
    NotActive(WorkItemId),

    #[error("Work item {id} cannot be dispatched from state {state:?}")]
    NotDispatchable { id: WorkItemId, state: WorkItemState },

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Execution error: {0}")]
    Execution(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Handler already registered for work item type: {0}")]
    DuplicateHandler(String),

    #[error("No handler registered for work item type: {0}")]
    UnknownHandler(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkItemError {
    #[error("Invalid transition for work item {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: WorkItemId,
        from: WorkItemState,
        to: WorkItemState,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Process definition not found: {0}")]
    NotFound(String),

    #[error("Process definition already registered: {0}")]
    Duplicate(String),

    #[error("Invalid process definition: {0}")]
    Invalid(String),

    #[error("Process instance was dropped before it finished")]
    Dropped,
}

/// Faults raised by handler code that did not declare a handling strategy.
///
/// The engine normalizes every one of these into a `Rethrow` failure signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter type for '{field}': expected {expected}, got {actual}")]
    InvalidParameterType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}
