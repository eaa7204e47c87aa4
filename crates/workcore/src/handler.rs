use crate::{events::EventEmitter, HandlerError, HandlerOutcome, Value, WorkItem};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Pluggable code that performs the work for one work item type.
#[async_trait]
pub trait WorkItemHandler: Send + Sync {
    /// Work item type this handler serves (e.g. "custom-task", "http.request")
    fn work_item_type(&self) -> &str;

    /// Perform the work.
    ///
    /// Declared failures come back as `Ok(HandlerOutcome::Failed(..))` and
    /// carry their own handling strategy. `Err(HandlerError)` is an
    /// undeclared fault and is treated as `Rethrow`.
    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError>;

    /// Called when the item is aborted after this handler has run for it.
    ///
    /// Never runs concurrently with `execute` for the same item.
    async fn abort(&self, _item: &WorkItem) {}

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Execution context passed to each handler invocation
#[derive(Clone)]
pub struct WorkItemContext {
    /// Snapshot of the item being executed
    pub item: WorkItem,

    /// 1-based attempt number; greater than 1 on retries
    pub attempt: u32,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when an abort is requested for this item
    pub cancellation: CancellationToken,
}

impl WorkItemContext {
    pub fn new(item: WorkItem, attempt: u32, events: EventEmitter) -> Self {
        Self {
            item,
            attempt,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn require_parameter(&self, name: &str) -> Result<&Value, HandlerError> {
        self.item.require_parameter(name)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        self.item.require_str(name)
    }

    pub fn parameter_or(&self, name: &str, default: Value) -> Value {
        self.item.parameter(name).cloned().unwrap_or(default)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Descriptive information about a handler, used for listings
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
    pub parameters: Vec<ParameterDefinition>,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ParameterDefinition {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}
