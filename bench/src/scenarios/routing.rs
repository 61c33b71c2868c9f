//! Round-robin routing over a pool of handlers.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use relay_engine::{Future, MessageBus, WorkerId};

use crate::scenarios::{Scenario, Work, answer_work};

pub struct RoutingConfig {
    /// Handlers subscribed to `Work`.
    pub workers: usize,
    /// Events sent per round.
    pub events_per_round: usize,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            events_per_round: 1_000,
            seed: 12345,
        }
    }
}

pub struct RoutingScenario {
    config: RoutingConfig,
    bus: Arc<MessageBus>,
    workers: Vec<WorkerId>,
    rng: ChaCha8Rng,
    answered: usize,
}

impl RoutingScenario {
    pub fn new() -> Self {
        Self::with_config(RoutingConfig::default())
    }

    pub fn with_config(config: RoutingConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            bus: Arc::new(MessageBus::new()),
            workers: Vec::new(),
            rng,
            answered: 0,
        }
    }

    /// Events whose future was resolved so far.
    pub fn answered(&self) -> usize {
        self.answered
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}

impl Default for RoutingScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for RoutingScenario {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn description(&self) -> &'static str {
        "Events routed round robin to a handler pool, answered through futures"
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn messages_per_round(&self) -> usize {
        self.config.events_per_round
    }

    fn setup(&mut self) {
        for _ in 0..self.config.workers {
            let id = self.bus.next_worker_id();
            self.bus.register(id);
            if self.bus.subscribe_event::<Work>(id).is_ok() {
                self.workers.push(id);
            }
        }
    }

    fn update(&mut self) {
        let futures: Vec<Future<u64>> = (0..self.config.events_per_round)
            .filter_map(|_| {
                self.bus.send_event(Work {
                    payload: self.rng.r#gen(),
                })
            })
            .collect();

        for id in &self.workers {
            answer_work(&self.bus, *id);
        }
        self.answered += futures.iter().filter(|future| future.is_done()).count();
    }

    fn teardown(&mut self) {
        for id in self.workers.drain(..) {
            self.bus.unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_is_answered() {
        let mut scenario = RoutingScenario::with_config(RoutingConfig {
            workers: 3,
            events_per_round: 30,
            seed: 1,
        });
        scenario.setup();

        scenario.update();
        scenario.update();

        assert_eq!(scenario.worker_count(), 3);
        assert_eq!(scenario.answered(), 60);
        assert_eq!(scenario.bus().pending_events(), 0);
        assert_eq!(scenario.bus().stats().events_sent, 60);

        scenario.teardown();
        assert_eq!(scenario.bus().worker_count(), 0);
    }
}
