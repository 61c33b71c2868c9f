//! The message bus: typed messages, futures, and the broker that routes them.
//!
//! # Message kinds
//!
//! - [`Event`]: delivered to exactly one subscriber, chosen round robin. The sender receives a
//!   [`Future`] that the handling worker resolves through [`MessageBus::complete`].
//! - [`Broadcast`]: delivered to every current subscriber. No result.
//!
//! A type is declared as one kind or the other, usually with the derive macros:
//!
//! ```rust,ignore
//! use relay_engine::bus::{Broadcast, Event};
//!
//! #[derive(Event)]
//! #[event(output = u64)]
//! struct Checksum { bytes: Vec<u8> }
//!
//! #[derive(Broadcast)]
//! struct Shutdown;
//! ```
//!
//! The bus itself keeps a message type registered as a single kind; subscribing the same type
//! as both is rejected with [`BusError::KindConflict`].

mod broker;
mod envelope;
mod error;
mod future;
mod inbox;
mod roster;
mod stats;

use std::{any::Any, fmt};

use serde::Serialize;

pub use broker::MessageBus;
pub use envelope::{Envelope, Inbound};
pub use error::{BusError, FutureError};
pub use future::Future;
pub use stats::StatsSnapshot;

pub use relay_macros::{Broadcast, Event};

/// Anything that can travel through the bus.
///
/// Blanket-implemented for every `'static + Send + Sync` type; message kinds are chosen with
/// [`Event`] or [`Broadcast`].
pub trait Message: Any + Send + Sync {}

impl<T: Any + Send + Sync> Message for T {}

/// A message routed to a single subscriber that answers with an [`Output`](Event::Output).
pub trait Event: Message {
    /// The value the handling worker completes the event with.
    type Output: Send + Sync + 'static;
}

/// A message fanned out to every subscriber.
pub trait Broadcast: Message {}

/// Which kind a message type has been registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Event,
    Broadcast,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Event => write!(f, "event"),
            MessageKind::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Identifies a worker on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Construct a worker identifier from a raw value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        WorkerId(id)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// Identity of one sent event, assigned by the bus.
///
/// Two equal event values sent twice are two events with two ids; the pending-result table is
/// keyed on this id, never on the event's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub(crate) const fn new(id: u64) -> Self {
        EventId(id)
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}
