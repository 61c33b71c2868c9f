//! Counters describing bus traffic.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct BusStats {
    events_sent: AtomicU64,
    events_undeliverable: AtomicU64,
    events_completed: AtomicU64,
    events_rerouted: AtomicU64,
    broadcasts_sent: AtomicU64,
    broadcast_deliveries: AtomicU64,
}

impl BusStats {
    pub fn event_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_undeliverable(&self) {
        self.events_undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_completed(&self) {
        self.events_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_rerouted(&self) {
        self.events_rerouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self, deliveries: usize) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
        self.broadcast_deliveries
            .fetch_add(deliveries as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_undeliverable: self.events_undeliverable.load(Ordering::Relaxed),
            events_completed: self.events_completed.load(Ordering::Relaxed),
            events_rerouted: self.events_rerouted.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            broadcast_deliveries: self.broadcast_deliveries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the bus counters.
///
/// Counters only grow. Under concurrent traffic the fields are read one at a time, so a
/// snapshot may be a few messages out of step between fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Events enqueued onto an inbox.
    pub events_sent: u64,
    /// Events sent to a type with no live subscriber.
    pub events_undeliverable: u64,
    /// Events whose future was resolved through the bus.
    pub events_completed: u64,
    /// Queued events moved to another subscriber when their worker unregistered.
    pub events_rerouted: u64,
    /// Calls to `send_broadcast`.
    pub broadcasts_sent: u64,
    /// Broadcast copies enqueued across all recipients.
    pub broadcast_deliveries: u64,
}
