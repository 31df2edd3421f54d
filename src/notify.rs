use tokio::sync::broadcast;

use crate::calendar::CalendarEvent;

const CHANNEL_CAPACITY: usize = 256;

/// What subscribed UI layers hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Canonical state changed; the full recomputed event list.
    Projection(Vec<CalendarEvent>),
    /// A store rejected a mutation and local state was rolled back. Shown as a blocking alert.
    MutationRejected { id: String, message: String },
    /// Listing the store failed; local state was kept as is.
    FetchFailed { message: String },
}

/// Broadcast hub for reconciler changes.
pub struct ChangeHub {
    sender: broadcast::Sender<Change>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }

    /// Send a change. No-op if nobody is listening.
    pub fn send(&self, change: Change) {
        let _ = self.sender.send(change);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
