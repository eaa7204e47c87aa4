use crate::{AbortReason, ProcessFault, Results, WorkItem};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Boundary toward the orchestrating process.
///
/// The engine invokes exactly one of these per work item, exactly once.
#[async_trait]
pub trait ProcessCallback: Send + Sync {
    /// The item finished; the process may advance.
    async fn complete(&self, item: &WorkItem, results: Results);

    /// The item was aborted; the process decides whether an alternate path
    /// exists.
    async fn abort(&self, item: &WorkItem, reason: AbortReason);

    /// The item raised a process-level fault.
    async fn fail(&self, item: &WorkItem, fault: ProcessFault);
}

/// Terminal callback captured as a message.
#[derive(Debug, Clone)]
pub enum Termination {
    Completed { item: WorkItem, results: Results },
    Aborted { item: WorkItem, reason: AbortReason },
    Failed { item: WorkItem, fault: ProcessFault },
}

impl Termination {
    pub fn item(&self) -> &WorkItem {
        match self {
            Termination::Completed { item, .. }
            | Termination::Aborted { item, .. }
            | Termination::Failed { item, .. } => item,
        }
    }
}

/// Callback that forwards every terminal notification over a channel.
#[derive(Clone)]
pub struct ChannelCallback {
    sender: mpsc::UnboundedSender<Termination>,
}

impl ChannelCallback {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Termination>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, termination: Termination) {
        if self.sender.send(termination).is_err() {
            tracing::warn!("Termination dropped: receiver is gone");
        }
    }
}

#[async_trait]
impl ProcessCallback for ChannelCallback {
    async fn complete(&self, item: &WorkItem, results: Results) {
        self.forward(Termination::Completed {
            item: item.clone(),
            results,
        });
    }

    async fn abort(&self, item: &WorkItem, reason: AbortReason) {
        self.forward(Termination::Aborted {
            item: item.clone(),
            reason,
        });
    }

    async fn fail(&self, item: &WorkItem, fault: ProcessFault) {
        self.forward(Termination::Failed {
            item: item.clone(),
            fault,
        });
    }
}
