//! Per-worker message queues.

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::bus::Envelope;

/// A worker's private FIFO queue.
///
/// The bus owns the only long-lived sender. A waiting worker works on a clone of the receiver,
/// so removing the inbox from the bus disconnects the channel and wakes the waiter.
pub(crate) struct Inbox {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
}

impl Inbox {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Enqueue a message. Never blocks.
    pub fn push(&self, envelope: Envelope) {
        // The inbox holds a receiver itself, so the channel cannot be disconnected here.
        let _ = self.sender.send(envelope);
    }

    pub fn receiver(&self) -> Receiver<Envelope> {
        self.receiver.clone()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Take everything still queued, in order.
    pub fn drain(&self) -> Vec<Envelope> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Broadcast;
    use std::sync::Arc;

    #[derive(Broadcast)]
    struct Marker(u8);

    #[test]
    fn push_then_drain_preserves_order() {
        let inbox = Inbox::new();
        for n in 0..3 {
            inbox.push(Envelope::broadcast(Arc::new(Marker(n))));
        }
        assert_eq!(inbox.len(), 3);

        let drained: Vec<u8> = inbox
            .drain()
            .iter()
            .map(|envelope| envelope.downcast::<Marker>().unwrap().0)
            .collect();

        assert_eq!(drained, vec![0, 1, 2]);
        assert_eq!(inbox.len(), 0);
    }

    #[test]
    fn dropping_the_inbox_disconnects_waiters() {
        let inbox = Inbox::new();
        let receiver = inbox.receiver();

        drop(inbox);

        assert!(receiver.recv().is_err());
    }
}
