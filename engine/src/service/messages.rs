//! Broadcasts every worker can rely on.

use crate::bus::{Broadcast, WorkerId};

/// Emitted by the [`TimeService`](crate::service::TimeService) once per tick interval.
///
/// Ticks are numbered from `1` up to the configured duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Broadcast)]
pub struct Tick {
    pub tick: u64,
}

/// Sent by every worker as the last thing it does before leaving the bus.
#[derive(Debug, Clone, PartialEq, Eq, Broadcast)]
pub struct Terminated {
    pub sender: WorkerId,
    pub name: String,
}

/// Sent by a worker that hit an unrecoverable error.
///
/// Workers that subscribe to it are expected to terminate as well.
#[derive(Debug, Clone, PartialEq, Eq, Broadcast)]
pub struct Crashed {
    pub sender: WorkerId,
    pub name: String,
    pub reason: String,
}
