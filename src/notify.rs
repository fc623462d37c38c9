use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-hall broadcast of committed events. Side-effect collaborators — the
/// mail sender reacting to approve/reject, review gating reacting to
/// check-in, reporting — subscribe here and run strictly after the
/// transition has been persisted.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a hall. Creates the channel if needed.
    pub fn subscribe(&self, hall_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(hall_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, hall_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&hall_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a hall's channel once the hall is deleted.
    pub fn remove(&self, hall_id: &Ulid) {
        self.channels.remove(hall_id);
    }
}
