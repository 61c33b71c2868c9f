//! The job simulation: producers hand out work on every tick, handlers do it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::{debug, info, warn};
use relay_engine::{
    Context, Future, MicroService, Setup,
    bus::Event,
    service::{Crashed, ServiceError, Terminated, Tick, TimeService},
};

/// A unit of work. Answered with a checksum of its payload.
#[derive(Debug, Event)]
#[event(output = u64)]
pub struct Job {
    pub tick: u64,
    pub seq: u64,
    pub payload: u64,
}

impl Job {
    fn checksum(&self) -> u64 {
        // FNV-1a over the payload bytes.
        self.payload
            .to_le_bytes()
            .iter()
            .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
                (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
            })
    }
}

/// Job counters shared by every producer of a run.
#[derive(Debug, Default)]
pub struct JobTotals {
    pub sent: AtomicU64,
    pub answered: AtomicU64,
    pub dropped: AtomicU64,
    pub unanswered: AtomicU64,
}

impl JobTotals {
    pub fn get(&self) -> (u64, u64, u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.answered.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.unanswered.load(Ordering::Relaxed),
        )
    }
}

fn stop_with_clock(context: &mut Context, notice: &Terminated) {
    if notice.name == TimeService::NAME {
        context.terminate();
    }
}

pub struct JobProducer {
    name: String,
    jobs_per_tick: u64,
    crash_at: Option<u64>,
    next_seq: u64,
    outstanding: Vec<Future<u64>>,
    totals: Arc<JobTotals>,
}

impl JobProducer {
    pub fn new(index: usize, jobs_per_tick: u64, totals: Arc<JobTotals>) -> Self {
        Self {
            name: format!("Producer-{index}"),
            jobs_per_tick,
            crash_at: None,
            next_seq: 0,
            outstanding: Vec::new(),
            totals,
        }
    }

    /// Crash when tick `tick` arrives.
    pub fn crash_at(mut self, tick: Option<u64>) -> Self {
        self.crash_at = tick;
        self
    }

    fn collect_answers(&mut self) {
        let before = self.outstanding.len();
        self.outstanding.retain(|future| future.try_get().is_none());
        let answered = (before - self.outstanding.len()) as u64;
        self.totals.answered.fetch_add(answered, Ordering::Relaxed);
    }

    fn on_tick(&mut self, context: &mut Context, tick: u64) {
        if self.crash_at == Some(tick) {
            context.crash(format!("{} refused tick {tick}", self.name));
            return;
        }
        self.collect_answers();

        for _ in 0..self.jobs_per_tick {
            let job = Job {
                tick,
                seq: self.next_seq,
                payload: tick.wrapping_mul(1_000_003) ^ self.next_seq,
            };
            self.next_seq += 1;
            match context.send_event(job) {
                Some(future) => {
                    self.totals.sent.fetch_add(1, Ordering::Relaxed);
                    self.outstanding.push(future);
                }
                None => {
                    self.totals.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        debug!(
            "{} tick {tick}: {} jobs outstanding",
            self.name,
            self.outstanding.len()
        );
    }
}

impl MicroService for JobProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_broadcast::<Tick, _>(|producer, context, tick| {
            producer.on_tick(context, tick.tick)
        })?;
        setup.subscribe_broadcast::<Terminated, _>(|_, context, notice| {
            stop_with_clock(context, notice)
        })?;
        setup.terminate_on::<Crashed>()
    }

    fn on_terminate(&mut self, _context: &mut Context) {
        self.collect_answers();
        let unanswered = self.outstanding.len() as u64;
        self.totals
            .unanswered
            .fetch_add(unanswered, Ordering::Relaxed);
        if unanswered > 0 {
            warn!("{} stopped with {unanswered} unanswered jobs", self.name);
        }
    }
}

pub struct JobHandler {
    name: String,
    handled: u64,
}

impl JobHandler {
    pub fn new(index: usize) -> Self {
        Self {
            name: format!("Handler-{index}"),
            handled: 0,
        }
    }
}

impl MicroService for JobHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_event::<Job, _>(|handler, context, job| {
            handler.handled += 1;
            context.complete(&job, job.checksum());
        })?;
        setup.subscribe_broadcast::<Terminated, _>(|_, context, notice| {
            stop_with_clock(context, notice)
        })?;
        setup.terminate_on::<Crashed>()
    }

    fn on_terminate(&mut self, _context: &mut Context) {
        info!("{} handled {} jobs", self.name, self.handled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_engine::{MessageBus, Runner, RunnerConfig, runner::Outcome};

    fn runner(duration: u64) -> Runner {
        Runner::new(
            Arc::new(MessageBus::new()),
            RunnerConfig {
                tick_interval_ms: 5,
                duration,
                shutdown_grace_ms: 1_000,
            },
        )
    }

    #[test]
    fn checksum_depends_on_payload() {
        let job = |payload| Job {
            tick: 1,
            seq: 0,
            payload,
        };

        assert_eq!(job(7).checksum(), job(7).checksum());
        assert_ne!(job(7).checksum(), job(8).checksum());
    }

    #[test]
    fn handlers_answer_producer_jobs() {
        let totals = Arc::new(JobTotals::default());
        let mut runner = runner(4);
        runner.add(JobProducer::new(1, 3, Arc::clone(&totals)));
        for index in 1..=2 {
            runner.add(JobHandler::new(index));
        }

        let report = runner.run().unwrap();
        let (sent, answered, dropped, unanswered) = totals.get();

        assert!(report.is_clean(), "{report:?}");
        assert_eq!(sent, 12);
        assert_eq!(dropped, 0);
        assert_eq!(answered + unanswered, sent);
        assert!(answered > 0);
    }

    #[test]
    fn jobs_without_handlers_are_dropped() {
        let totals = Arc::new(JobTotals::default());
        let mut runner = runner(2);
        runner.add(JobProducer::new(1, 2, Arc::clone(&totals)));

        runner.run().unwrap();

        assert_eq!(totals.get(), (0, 0, 4, 0));
    }

    #[test]
    fn crashing_producer_stops_the_run() {
        let totals = Arc::new(JobTotals::default());
        let mut runner = runner(1_000);
        runner.add(JobProducer::new(1, 1, Arc::clone(&totals)).crash_at(Some(2)));
        runner.add(JobHandler::new(1));

        let report = runner.run().unwrap();

        let crashed = report.crashed().unwrap();
        assert_eq!(crashed.name, "Producer-1");
        assert!(matches!(crashed.outcome, Outcome::Crashed { .. }));
        assert!(report.ticks < 1_000);
    }
}
