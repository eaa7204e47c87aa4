//! Core abstractions for the work item engine
//!
//! This crate provides the data model, the handler and callback traits and
//! the failure signalling types that every other crate depends on. It does
//! not execute anything itself.

mod callback;
mod error;
pub mod events;
mod handler;
mod process;
mod signal;
mod value;
mod work_item;

pub use callback::{ChannelCallback, ProcessCallback, Termination};
pub use error::{EngineError, HandlerError, ProcessError, RegistryError, WorkItemError};
pub use events::{EventBus, EventEmitter, HandlerEvent, WorkItemEvent};
pub use handler::{HandlerMetadata, ParameterDefinition, WorkItemContext, WorkItemHandler};
pub use process::{ErrorBoundary, ProcessDefinition, ProcessStatus, TaskSpec};
pub use signal::{
    AbortReason, FailureSignal, FaultKind, HandlerOutcome, HandlingStrategy, ProcessFault,
    ERROR_RESULT_KEY, HANDLER_FAULT_CODE, TIMEOUT_CODE,
};
pub use value::{Parameters, Results, Value};
pub use work_item::{ProcessInstanceId, WorkItem, WorkItemId, WorkItemState};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
