//! Workers joining and leaving while events are queued.
//!
//! Each round sends a batch of events, then replaces a random handler before anyone drains
//! their inbox, so the departing handler's queue has to be rerouted.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use relay_engine::{Future, MessageBus, WorkerId};

use crate::scenarios::{Scenario, Work, answer_work};

pub struct ChurnConfig {
    /// Handlers alive at any time. Must be at least 2 for rerouting to succeed.
    pub workers: usize,
    pub events_per_round: usize,
    /// Handlers replaced per round.
    pub replacements_per_round: usize,
    pub seed: u64,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            events_per_round: 256,
            replacements_per_round: 2,
            seed: 12345,
        }
    }
}

pub struct ChurnScenario {
    config: ChurnConfig,
    bus: Arc<MessageBus>,
    workers: Vec<WorkerId>,
    rng: ChaCha8Rng,
    unresolved: usize,
}

impl ChurnScenario {
    pub fn new() -> Self {
        Self::with_config(ChurnConfig::default())
    }

    pub fn with_config(config: ChurnConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            bus: Arc::new(MessageBus::new()),
            workers: Vec::new(),
            rng,
            unresolved: 0,
        }
    }

    /// Events sent that were never answered.
    pub fn unresolved(&self) -> usize {
        self.unresolved
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    fn join(&mut self) {
        let id = self.bus.next_worker_id();
        self.bus.register(id);
        if self.bus.subscribe_event::<Work>(id).is_ok() {
            self.workers.push(id);
        }
    }

    fn leave_random(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let index = self.rng.gen_range(0..self.workers.len());
        let id = self.workers.swap_remove(index);
        self.bus.unregister(id);
    }
}

impl Default for ChurnScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for ChurnScenario {
    fn name(&self) -> &'static str {
        "churn"
    }

    fn description(&self) -> &'static str {
        "Handlers replaced mid-round, forcing queued events to be rerouted"
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn messages_per_round(&self) -> usize {
        self.config.events_per_round
    }

    fn setup(&mut self) {
        for _ in 0..self.config.workers {
            self.join();
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

        for _ in 0..self.config.replacements_per_round {
            self.leave_random();
            self.join();
        }

        for id in &self.workers {
            answer_work(&self.bus, *id);
        }
        self.unresolved += futures.iter().filter(|future| !future.is_done()).count();
    }

    fn teardown(&mut self) {
        for id in self.workers.drain(..) {
            self.bus.unregister(id);
        }
    }
}
