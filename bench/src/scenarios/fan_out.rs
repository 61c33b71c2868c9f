//! Broadcast fan-out to every subscriber.

use std::sync::Arc;

use relay_engine::{MessageBus, WorkerId};

use crate::scenarios::{Notice, Scenario};

pub struct FanOutConfig {
    pub subscribers: usize,
    pub broadcasts_per_round: usize,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            subscribers: 32,
            broadcasts_per_round: 100,
        }
    }
}

pub struct FanOutScenario {
    config: FanOutConfig,
    bus: Arc<MessageBus>,
    subscribers: Vec<WorkerId>,
    round: u64,
    received: usize,
}

impl FanOutScenario {
    pub fn new() -> Self {
        Self::with_config(FanOutConfig::default())
    }

    pub fn with_config(config: FanOutConfig) -> Self {
        Self {
            config,
            bus: Arc::new(MessageBus::new()),
            subscribers: Vec::new(),
            round: 0,
            received: 0,
        }
    }

    /// Broadcast copies drained from inboxes so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

impl Default for FanOutScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for FanOutScenario {
    fn name(&self) -> &'static str {
        "fan_out"
    }

    fn description(&self) -> &'static str {
        "Broadcasts delivered to every subscriber's inbox"
    }

    fn worker_count(&self) -> usize {
        self.subscribers.len()
    }

    fn messages_per_round(&self) -> usize {
        self.config.broadcasts_per_round * self.config.subscribers
    }

    fn setup(&mut self) {
        for _ in 0..self.config.subscribers {
            let id = self.bus.next_worker_id();
            self.bus.register(id);
            if self.bus.subscribe_broadcast::<Notice>(id).is_ok() {
                self.subscribers.push(id);
            }
        }
    }

    fn update(&mut self) {
        self.round += 1;
        for _ in 0..self.config.broadcasts_per_round {
            self.bus.send_broadcast(Notice { round: self.round });
        }
        for id in &self.subscribers {
            while let Ok(Some(envelope)) = self.bus.try_message(*id) {
                if envelope.is::<Notice>() {
                    self.received += 1;
                }
            }
        }
    }

    fn teardown(&mut self) {
        for id in self.subscribers.drain(..) {
            self.bus.unregister(id);
        }
    }
}
