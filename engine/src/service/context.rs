use std::sync::Arc;

use log::{debug, error};

use crate::{
    bus::{Broadcast, Event, Future, Inbound, MessageBus, WorkerId},
    service::Crashed,
};

/// A worker's handle on the bus, passed to every hook and handler.
///
/// Sends go out under the worker's identity; `terminate` and `crash` only take effect once the
/// current handler returns.
pub struct Context {
    id: WorkerId,
    name: String,
    bus: Arc<MessageBus>,
    terminated: bool,
    crash_reason: Option<String>,
}

impl Context {
    pub(crate) fn new(id: WorkerId, name: String, bus: Arc<MessageBus>) -> Self {
        Self {
            id,
            name,
            bus,
            terminated: false,
            crash_reason: None,
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// See [`MessageBus::send_event`].
    pub fn send_event<E: Event>(&self, event: E) -> Option<Future<E::Output>> {
        self.bus.send_event(event)
    }

    /// See [`MessageBus::send_broadcast`].
    pub fn send_broadcast<B: Broadcast>(&self, message: B) -> usize {
        self.bus.send_broadcast(message)
    }

    /// See [`MessageBus::complete`].
    pub fn complete<E: Event>(&self, event: &Inbound<E>, result: E::Output) -> bool {
        self.bus.complete(event, result)
    }

    /// Stop the run loop after the current message.
    pub fn terminate(&mut self) {
        if !self.terminated {
            debug!("{} ({}) terminating", self.name, self.id);
            self.terminated = true;
        }
    }

    /// Announce an unrecoverable error with a [`Crashed`] broadcast and terminate.
    ///
    /// Only the first crash of a worker is announced.
    pub fn crash(&mut self, reason: impl Into<String>) {
        if self.crash_reason.is_some() {
            return;
        }
        let reason = reason.into();
        error!("{} ({}) crashed: {reason}", self.name, self.id);

        self.send_broadcast(Crashed {
            sender: self.id,
            name: self.name.clone(),
            reason: reason.clone(),
        });
        self.crash_reason = Some(reason);
        self.terminate();
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) fn crash_reason(&self) -> Option<&str> {
        self.crash_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(bus: &Arc<MessageBus>) -> Context {
        let id = bus.next_worker_id();
        bus.register(id);
        Context::new(id, String::from("test"), Arc::clone(bus))
    }

    #[test]
    fn crash_announces_once_and_terminates() {
        let bus = Arc::new(MessageBus::new());
        let listener = bus.next_worker_id();
        bus.register(listener);
        bus.subscribe_broadcast::<Crashed>(listener).unwrap();
        let mut context = context(&bus);

        context.crash("disk full");
        context.crash("again");

        assert!(context.is_terminated());
        assert_eq!(context.crash_reason(), Some("disk full"));
        assert_eq!(bus.inbox_len(listener), Some(1));

        let notice = bus
            .try_message(listener)
            .unwrap()
            .unwrap()
            .downcast::<Crashed>()
            .unwrap();
        assert_eq!(notice.sender, context.id());
        assert_eq!(notice.name, "test");
        assert_eq!(notice.reason, "disk full");
    }

    #[test]
    fn terminate_does_not_broadcast() {
        let bus = Arc::new(MessageBus::new());
        let listener = bus.next_worker_id();
        bus.register(listener);
        bus.subscribe_broadcast::<Crashed>(listener).unwrap();
        let mut context = context(&bus);

        context.terminate();

        assert!(context.is_terminated());
        assert_eq!(context.crash_reason(), None);
        assert_eq!(bus.inbox_len(listener), Some(0));
    }
}
