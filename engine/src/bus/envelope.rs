//! Type-erased messages as they sit in a worker's inbox.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    ops::Deref,
    sync::Arc,
};

use crate::bus::{Broadcast, Event, EventId, Message};

/// A message in transit.
///
/// The payload is shared behind an `Arc`, so a broadcast delivered to several workers is the
/// same instance in every inbox.
#[derive(Clone)]
pub struct Envelope {
    event_id: Option<EventId>,
    type_id: TypeId,
    type_name: &'static str,
    body: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    pub(crate) fn event<E: Event>(id: EventId, event: E) -> Self {
        Self {
            event_id: Some(id),
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            body: Arc::new(event),
        }
    }

    pub(crate) fn broadcast<B: Broadcast>(message: Arc<B>) -> Self {
        Self {
            event_id: None,
            type_id: TypeId::of::<B>(),
            type_name: type_name::<B>(),
            body: message,
        }
    }

    /// The runtime type of the payload, used to look up the handler.
    #[inline]
    pub fn message_type(&self) -> TypeId {
        self.type_id
    }

    /// Human-readable name of the payload type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The event identity, or `None` for a broadcast.
    #[inline]
    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    #[inline]
    pub fn is_event(&self) -> bool {
        self.event_id.is_some()
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.event_id.is_none()
    }

    /// Returns `true` if the payload is an `M`.
    #[inline]
    pub fn is<M: Message>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }

    /// Shared handle to the payload if it is an `M`.
    pub fn downcast<M: Message>(&self) -> Option<Arc<M>> {
        Arc::clone(&self.body).downcast::<M>().ok()
    }

    /// Typed view of the payload if this envelope carries an event of type `E`.
    pub fn inbound<E: Event>(&self) -> Option<Inbound<E>> {
        let id = self.event_id?;
        let event = self.downcast::<E>()?;
        Some(Inbound { id, event })
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("event_id", &self.event_id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// An event delivered to its handler.
///
/// Dereferences to the event itself and remembers which send it came from, so the handler can
/// answer with [`MessageBus::complete`](crate::bus::MessageBus::complete).
pub struct Inbound<E> {
    id: EventId,
    event: Arc<E>,
}

impl<E> Inbound<E> {
    /// The identity assigned to this event when it was sent.
    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Shared handle to the event payload.
    #[inline]
    pub fn event(&self) -> &Arc<E> {
        &self.event
    }
}

impl<E> Deref for Inbound<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.event
    }
}

impl<E> Clone for Inbound<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            event: Arc::clone(&self.event),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Inbound<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbound")
            .field("id", &self.id)
            .field("event", &self.event)
            .finish()
    }
}
