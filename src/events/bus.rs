//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] so that the master loop,
//! the admin link and the startup gate can publish without ever blocking on a consumer.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                   Consumers:
//!   Master loop  ──┐
//!   Startup gate ──┼──────► Bus ───────► subscriber listener ────► SubscriberSet
//!   Admin link   ──┤  (broadcast chan)  └► Bus::subscribe() receivers (tests, embedders)
//!   Subscribers  ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: a send never waits; with no receivers the event is dropped.
//! - **Bounded capacity**: one ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_published_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::ProxyReady));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::MasterExited));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::MasterExited);
    }

    #[test]
    fn publish_without_receivers_does_not_fail() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ProxyReady));
    }
}
