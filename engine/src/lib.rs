//! In-process message bus runtime.
//!
//! Independent workers ([`service::MicroService`]) run on their own threads and talk to each
//! other only through a shared [`bus::MessageBus`]:
//!
//! - **Events** are routed round robin to exactly one subscriber and answered through a
//!   [`bus::Future`].
//! - **Broadcasts** fan out to every current subscriber and carry no result.
//!
//! The [`runner`] module wires a set of workers together with a
//! [`service::TimeService`] clock, a startup barrier and a cooperative shutdown.

// Allows the derive macros to refer to `::relay_engine` from inside this crate.
extern crate self as relay_engine;

pub mod bus;
pub mod core;
pub mod runner;
pub mod service;

pub use bus::{Broadcast, Event, Future, MessageBus, WorkerId};
pub use runner::{RunReport, Runner, RunnerConfig};
pub use service::{Context, MicroService, Setup};
