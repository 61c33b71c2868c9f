use std::{any::TypeId, collections::HashMap, marker::PhantomData};

use crate::{
    bus::{Broadcast, Envelope, Event, Inbound},
    service::{Context, ServiceError},
};

type Handler<S> = Box<dyn FnMut(&mut S, &mut Context, &Envelope) + Send>;

/// Message handlers of one worker, keyed by message type.
pub(crate) struct Handlers<S> {
    table: HashMap<TypeId, Handler<S>>,
}

impl<S> Handlers<S> {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Install `handler` for `type_id`, replacing any previous one.
    fn insert(&mut self, type_id: TypeId, handler: Handler<S>) {
        self.table.insert(type_id, handler);
    }

    /// Run the handler registered for the envelope's type.
    ///
    /// Returns `false` if no handler is registered.
    pub fn dispatch(&mut self, service: &mut S, context: &mut Context, envelope: &Envelope) -> bool {
        match self.table.get_mut(&envelope.message_type()) {
            Some(handler) => {
                handler(service, context, envelope);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}

/// Handed to [`MicroService::initialize`](crate::service::MicroService::initialize) to declare
/// which messages the worker handles.
///
/// Each subscription registers the worker with the bus and installs the handler in one step,
/// so every subscription is in place before the worker consumes its first message.
pub struct Setup<'a, S> {
    context: &'a mut Context,
    handlers: &'a mut Handlers<S>,
    _service: PhantomData<fn(&mut S)>,
}

impl<'a, S: 'static> Setup<'a, S> {
    pub(crate) fn new(context: &'a mut Context, handlers: &'a mut Handlers<S>) -> Self {
        Self {
            context,
            handlers,
            _service: PhantomData,
        }
    }

    /// Handle events of type `E`. The handler is expected to
    /// [`complete`](Context::complete) every event it receives.
    pub fn subscribe_event<E, F>(&mut self, mut handler: F) -> Result<(), ServiceError>
    where
        E: Event,
        F: FnMut(&mut S, &mut Context, Inbound<E>) + Send + 'static,
    {
        self.context.bus().subscribe_event::<E>(self.context.id())?;
        self.handlers.insert(
            TypeId::of::<E>(),
            Box::new(move |service, context, envelope| {
                if let Some(event) = envelope.inbound::<E>() {
                    handler(service, context, event);
                }
            }),
        );
        Ok(())
    }

    /// Handle broadcasts of type `B`.
    pub fn subscribe_broadcast<B, F>(&mut self, mut handler: F) -> Result<(), ServiceError>
    where
        B: Broadcast,
        F: FnMut(&mut S, &mut Context, &B) + Send + 'static,
    {
        self.context.bus().subscribe_broadcast::<B>(self.context.id())?;
        self.handlers.insert(
            TypeId::of::<B>(),
            Box::new(move |service, context, envelope| {
                if let Some(message) = envelope.downcast::<B>() {
                    handler(service, context, &message);
                }
            }),
        );
        Ok(())
    }

    /// Terminate the worker as soon as a `B` broadcast arrives.
    pub fn terminate_on<B: Broadcast>(&mut self) -> Result<(), ServiceError> {
        self.subscribe_broadcast::<B, _>(|_, context, _| context.terminate())
    }

    pub fn context(&mut self) -> &mut Context {
        self.context
    }
}
