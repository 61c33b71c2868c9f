//! Workers: the units that consume messages from the bus.
//!
//! A worker is any type implementing [`MicroService`]. [`Worker`] wraps it with an inbox, a
//! handler table and the `Created → Running → Terminated` lifecycle, and is normally driven on
//! its own thread by the [`Runner`](crate::runner::Runner).
//!
//! ```rust,ignore
//! struct Echo;
//!
//! impl MicroService for Echo {
//!     fn name(&self) -> &str {
//!         "Echo"
//!     }
//!
//!     fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
//!         setup.subscribe_event::<Shout, _>(|_, context, shout| {
//!             context.complete(&shout, shout.0.to_uppercase());
//!         })?;
//!         setup.terminate_on::<Terminated>()
//!     }
//! }
//! ```

mod clock;
mod context;
mod handlers;
mod messages;
mod state;
mod worker;

use thiserror::Error;

use crate::bus::BusError;

pub use clock::TimeService;
pub use context::Context;
pub use handlers::Setup;
pub use messages::{Crashed, Terminated, Tick};
pub use state::State;
pub use worker::{Outcome, Worker, WorkerReport};

pub(crate) use worker::Runnable;

/// Behavior of a worker.
///
/// Handlers run one at a time on the worker's thread, so implementations need no internal
/// synchronization.
pub trait MicroService: Send + Sized + 'static {
    /// Name used for the worker's thread and in log output.
    fn name(&self) -> &str;

    /// Subscribe to messages and install their handlers.
    ///
    /// Runs before the worker consumes anything. Returning an error crashes the worker.
    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError>;

    /// Called once when the run loop starts, after every worker has been initialized.
    fn on_start(&mut self, _context: &mut Context) {}

    /// Called once when the run loop exits, before the worker leaves the bus.
    fn on_terminate(&mut self, _context: &mut Context) {}
}

/// Errors raised while setting up a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("initialization failed: {0}")]
    Init(String),
}
