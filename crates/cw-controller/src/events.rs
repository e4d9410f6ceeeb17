use std::sync::{Arc, Mutex, PoisonError};

use cw_core::types::TimestampNanos;

use crate::lifecycle::Operation;

/// Something an operator-facing surface should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// A status refetch replaced the local chore set.
    Refreshed { canister_id: String, instances: usize },
    /// A write was accepted by the remote.
    Applied {
        operation: Operation,
        chore_id: String,
    },
    /// A write or fetch failed. Local state was left untouched.
    Failed {
        operation: Operation,
        chore_id: Option<String>,
        message: String,
    },
    /// The first half of a two-call write landed, the second did not.
    PartialWrite { chore_id: String, message: String },
    /// The confirmed value differs from what was requested.
    Mismatch {
        chore_id: String,
        requested: TimestampNanos,
        confirmed: Option<TimestampNanos>,
    },
    /// Distribution lists of a chore were re-fetched after a write.
    ListsReplaced { chore_id: String, count: usize },
}

impl ControllerEvent {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ControllerEvent::Failed { .. }
                | ControllerEvent::PartialWrite { .. }
                | ControllerEvent::Mismatch { .. }
        )
    }
}

/// Fan-out of [`ControllerEvent`]s over flume channels.
///
/// Every [`subscribe`](EventBus::subscribe) call gets its own receiver that
/// sees all events published after it subscribed. Cloning shares the bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<flume::Sender<ControllerEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> flume::Receiver<ControllerEvent> {
        let (tx, rx) = flume::unbounded();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Send to every live subscriber, pruning the ones that hung up.
    pub fn publish(&self, event: ControllerEvent) {
        let mut senders = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
