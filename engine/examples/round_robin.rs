//! Three handlers share the work of one requester.
//!
//! Every tick the requester sends a batch of `Square` events and waits for the answers; the
//! bus hands each event to the next handler in turn.

use std::{sync::Arc, time::Duration};

use relay_engine::{
    Context, MessageBus, MicroService, Runner, RunnerConfig, Setup,
    bus::{Broadcast, Event},
    service::{ServiceError, Terminated, Tick, TimeService},
};

#[derive(Debug, Event)]
#[event(output = (u64, String))]
struct Square(u64);

#[derive(Debug, Broadcast)]
struct Report(String);

struct Squarer {
    name: String,
}

impl MicroService for Squarer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_event::<Square, _>(|squarer, context, square| {
            context.complete(&square, (square.0 * square.0, squarer.name.clone()));
        })?;
        setup.subscribe_broadcast::<Terminated, _>(|_, context, notice| {
            if notice.name == TimeService::NAME {
                context.terminate();
            }
        })
    }
}

struct Requester {
    batch: u64,
}

impl Requester {
    fn on_tick(&mut self, context: &mut Context, tick: u64) {
        let futures: Vec<_> = (0..self.batch)
            .filter_map(|n| context.send_event(Square(tick * 10 + n)))
            .collect();

        let answers: Vec<String> = futures
            .iter()
            .filter_map(|future| future.get_timeout(Duration::from_secs(1)).ok())
            .map(|(value, handler)| format!("{value}@{handler}"))
            .collect();
        context.send_broadcast(Report(format!("tick {tick}: {}", answers.join(", "))));
    }
}

impl MicroService for Requester {
    fn name(&self) -> &str {
        "Requester"
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_broadcast::<Tick, _>(|requester, context, tick| {
            requester.on_tick(context, tick.tick)
        })?;
        setup.subscribe_broadcast::<Terminated, _>(|_, context, notice| {
            if notice.name == TimeService::NAME {
                context.terminate();
            }
        })
    }
}

struct Printer;

impl MicroService for Printer {
    fn name(&self) -> &str {
        "Printer"
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_broadcast::<Report, _>(|_, _, report| println!("{}", report.0))?;
        setup.subscribe_broadcast::<Terminated, _>(|_, context, notice| {
            if notice.name == "Requester" {
                context.terminate();
            }
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Arc::new(MessageBus::new());
    let config = RunnerConfig {
        tick_interval_ms: 50,
        duration: 5,
        ..RunnerConfig::default()
    };

    let mut runner = Runner::new(bus, config);
    for n in 1..=3 {
        runner.add(Squarer {
            name: format!("Squarer-{n}"),
        });
    }
    runner.add(Requester { batch: 6 });
    runner.add(Printer);

    let report = runner.run()?;
    println!(
        "{} ticks, {} events sent, {} completed",
        report.ticks, report.stats.events_sent, report.stats.events_completed
    );
    Ok(())
}
