use thiserror::Error;

use crate::bus::{MessageKind, WorkerId};

/// Errors reported by [`MessageBus`](crate::bus::MessageBus) operations.
///
/// Expected outcomes such as an event with no subscriber are not errors; these variants cover
/// misuse of the bus and interrupted waits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("{0} is not registered with the bus")]
    NotRegistered(WorkerId),

    #[error("message type {type_name} is already registered as a {registered}")]
    KindConflict {
        type_name: &'static str,
        registered: MessageKind,
    },

    #[error("wait was cancelled")]
    Cancelled,

    #[error("inbox of {0} was removed while waiting")]
    Disconnected(WorkerId),
}

/// Why a [`Future`](crate::bus::Future) wait returned without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FutureError {
    #[error("timed out waiting for the result")]
    Timeout,

    #[error("wait was cancelled")]
    Cancelled,
}
