use crate::{ProcessInstanceId, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while work items execute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkItemEvent {
    WorkItemStarted {
        work_item_id: WorkItemId,
        process_instance_id: ProcessInstanceId,
        work_item_type: String,
        timestamp: DateTime<Utc>,
    },
    AttemptStarted {
        work_item_id: WorkItemId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    AttemptFailed {
        work_item_id: WorkItemId,
        attempt: u32,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RetryScheduled {
        work_item_id: WorkItemId,
        next_attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkItemCompleted {
        work_item_id: WorkItemId,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkItemAborted {
        work_item_id: WorkItemId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    WorkItemFailed {
        work_item_id: WorkItemId,
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    HandlerEvent {
        work_item_id: WorkItemId,
        event: HandlerEvent,
        timestamp: DateTime<Utc>,
    },
}

impl WorkItemEvent {
    pub fn work_item_id(&self) -> WorkItemId {
        match self {
            WorkItemEvent::WorkItemStarted { work_item_id, .. }
            | WorkItemEvent::AttemptStarted { work_item_id, .. }
            | WorkItemEvent::AttemptFailed { work_item_id, .. }
            | WorkItemEvent::RetryScheduled { work_item_id, .. }
            | WorkItemEvent::WorkItemCompleted { work_item_id, .. }
            | WorkItemEvent::WorkItemAborted { work_item_id, .. }
            | WorkItemEvent::WorkItemFailed { work_item_id, .. }
            | WorkItemEvent::HandlerEvent { work_item_id, .. } => *work_item_id,
        }
    }
}

/// Events a handler reports about its own progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum HandlerEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Emitter handed to handlers through their context
#[derive(Clone)]
pub struct EventEmitter {
    work_item_id: WorkItemId,
    sender: broadcast::Sender<WorkItemEvent>,
}

impl EventEmitter {
    pub fn new(work_item_id: WorkItemId, sender: broadcast::Sender<WorkItemEvent>) -> Self {
        Self {
            work_item_id,
            sender,
        }
    }

    pub fn emit(&self, event: HandlerEvent) {
        let _ = self.sender.send(WorkItemEvent::HandlerEvent {
            work_item_id: self.work_item_id,
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(HandlerEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(HandlerEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(HandlerEvent::Progress { percent, message });
    }
}

/// Broadcast bus shared by the engine and its subscribers.
///
/// Sending never blocks; events are dropped when nobody is subscribed and
/// slow subscribers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<WorkItemEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkItemEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: WorkItemEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, work_item_id: WorkItemId) -> EventEmitter {
        EventEmitter::new(work_item_id, self.sender.clone())
    }
}
