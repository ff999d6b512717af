use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-unit change feeds.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every persisted event for a unit. Creates the channel if needed.
    pub fn subscribe(&self, unit_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(unit_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, unit_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&unit_id) {
            let _ = sender.send(event.clone());
        }
    }
}
