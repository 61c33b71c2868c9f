//! Seeded bus workloads.
//!
//! Every scenario drives the bus from the calling thread and drains inboxes itself, so a
//! round measures broker overhead rather than thread scheduling.
//!
//! # Scenarios
//!
//! - **Routing**: many events spread round robin over a pool of handlers
//! - **Fan-out**: broadcasts copied to every subscriber
//! - **Churn**: workers joining and leaving while events are in flight

pub mod churn;
pub mod fan_out;
pub mod routing;

pub use churn::{ChurnConfig, ChurnScenario};
pub use fan_out::{FanOutConfig, FanOutScenario};
pub use routing::{RoutingConfig, RoutingScenario};

use relay_engine::{
    MessageBus, WorkerId,
    bus::{Broadcast, Event},
};

/// Work item answered with a mixed payload.
#[derive(Debug, Event)]
#[event(output = u64)]
pub struct Work {
    pub payload: u64,
}

impl Work {
    pub fn answer(&self) -> u64 {
        self.payload.rotate_left(17) ^ 0x9e37_79b9_7f4a_7c15
    }
}

/// Fan-out message carrying the round it was sent in.
#[derive(Debug, Broadcast)]
pub struct Notice {
    pub round: u64,
}

/// Common trait for benchmark scenarios.
pub trait Scenario {
    /// Human-readable name of the scenario.
    fn name(&self) -> &'static str;

    /// Brief description of what this scenario tests.
    fn description(&self) -> &'static str;

    /// Number of workers registered with the bus.
    fn worker_count(&self) -> usize;

    /// Messages moved by one call to [`update`](Scenario::update).
    fn messages_per_round(&self) -> usize;

    /// Register workers and subscriptions.
    fn setup(&mut self);

    /// Run one round of traffic.
    fn update(&mut self);

    /// Unregister every worker.
    fn teardown(&mut self);
}

/// Answer every `Work` event waiting for `id`. Returns the number handled.
pub(crate) fn answer_work(bus: &MessageBus, id: WorkerId) -> usize {
    let mut handled = 0;
    while let Ok(Some(envelope)) = bus.try_message(id) {
        if let Some(work) = envelope.inbound::<Work>() {
            bus.complete(&work, work.answer());
            handled += 1;
        }
    }
    handled
}
