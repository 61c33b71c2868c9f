//! The tick source that paces a run.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{info, trace, warn};

use crate::{
    bus::WorkerId,
    service::{Context, Crashed, MicroService, ServiceError, Setup, Terminated, Tick},
};

/// Fixed-step schedule anchored at the first tick.
///
/// Deadlines are computed from the start instant rather than from the previous tick, so time
/// spent handling a tick never accumulates into drift.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    start: Instant,
    interval: Duration,
}

impl Schedule {
    fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval,
        }
    }

    /// The instant at which tick `tick + 1` is due.
    fn deadline(&self, tick: u64) -> Instant {
        let step = u64::try_from(self.interval.as_nanos()).unwrap_or(u64::MAX);
        self.start + Duration::from_nanos(step.saturating_mul(tick))
    }

    fn sleep_until(&self, tick: u64) {
        let deadline = self.deadline(tick);
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
    }
}

/// Broadcasts [`Tick`]s at a fixed interval.
///
/// The clock emits tick `1` when it starts and each following tick once it has received its
/// own previous one, so every subscriber sees ticks in order. It terminates after `duration`
/// ticks, on any [`Crashed`] notice, or once every watched worker has announced
/// [`Terminated`].
pub struct TimeService {
    interval: Duration,
    duration: u64,
    watching: HashSet<WorkerId>,
    ticks: Arc<AtomicU64>,
    schedule: Option<Schedule>,
}

impl TimeService {
    pub const NAME: &'static str = "TimeService";

    pub fn new(interval: Duration, duration: u64) -> Self {
        Self {
            interval,
            duration,
            watching: HashSet::new(),
            ticks: Arc::new(AtomicU64::new(0)),
            schedule: None,
        }
    }

    /// Stop early once all of `workers` have terminated.
    pub fn watch(mut self, workers: impl IntoIterator<Item = WorkerId>) -> Self {
        self.watching.extend(workers);
        self
    }

    /// Shared counter holding the last tick emitted.
    pub fn ticks(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.ticks)
    }

    fn emit(&mut self, context: &mut Context, tick: u64) {
        self.ticks.store(tick, Ordering::Release);
        let delivered = context.send_broadcast(Tick { tick });
        trace!("tick {tick} delivered to {delivered}");
    }

    fn on_tick(&mut self, context: &mut Context, tick: u64) {
        if tick >= self.duration {
            info!("{} reached tick {tick}", Self::NAME);
            context.terminate();
            return;
        }
        if let Some(schedule) = self.schedule {
            schedule.sleep_until(tick);
        }
        self.emit(context, tick + 1);
    }

    fn on_terminated(&mut self, context: &mut Context, notice: &Terminated) {
        if self.watching.remove(&notice.sender) && self.watching.is_empty() {
            info!(
                "every worker terminated, stopping at tick {}",
                self.ticks.load(Ordering::Acquire)
            );
            context.terminate();
        }
    }
}

impl MicroService for TimeService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
        setup.subscribe_broadcast::<Tick, _>(|clock, context, tick| {
            clock.on_tick(context, tick.tick)
        })?;
        setup.subscribe_broadcast::<Terminated, _>(|clock, context, notice| {
            clock.on_terminated(context, notice)
        })?;
        setup.subscribe_broadcast::<Crashed, _>(|_, context, notice| {
            warn!("{} crashed ({}), stopping the clock", notice.name, notice.reason);
            context.terminate();
        })
    }

    fn on_start(&mut self, context: &mut Context) {
        if self.duration == 0 {
            context.terminate();
            return;
        }
        self.schedule = Some(Schedule::new(self.interval));
        self.emit(context, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::MessageBus,
        core::CancelToken,
        service::{Outcome, Worker},
    };

    fn listener(bus: &MessageBus) -> WorkerId {
        let id = bus.next_worker_id();
        bus.register(id);
        bus.subscribe_broadcast::<Tick>(id).unwrap();
        id
    }

    fn received_ticks(bus: &MessageBus, id: WorkerId) -> Vec<u64> {
        let mut ticks = Vec::new();
        while let Some(envelope) = bus.try_message(id).unwrap() {
            if let Some(tick) = envelope.downcast::<Tick>() {
                ticks.push(tick.tick);
            }
        }
        ticks
    }

    #[test]
    fn schedule_deadlines_are_anchored_at_start() {
        let schedule = Schedule::new(Duration::from_millis(10));

        assert_eq!(schedule.deadline(0), schedule.start);
        assert_eq!(
            schedule.deadline(3) - schedule.start,
            Duration::from_millis(30)
        );
    }

    #[test]
    fn emits_every_tick_in_order() {
        let bus = Arc::new(MessageBus::new());
        let observer = listener(&bus);
        let clock = TimeService::new(Duration::from_millis(2), 5);
        let ticks = clock.ticks();
        let worker = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id());

        let report = worker.run(&CancelToken::new());

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(ticks.load(Ordering::Acquire), 5);
        assert_eq!(received_ticks(&bus, observer), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ticks_follow_the_interval() {
        let bus = Arc::new(MessageBus::new());
        let clock = TimeService::new(Duration::from_millis(20), 5);
        let worker = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id());
        let start = Instant::now();

        worker.run(&CancelToken::new());

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(80), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }

    #[test]
    fn zero_duration_emits_nothing() {
        let bus = Arc::new(MessageBus::new());
        let observer = listener(&bus);
        let clock = TimeService::new(Duration::from_millis(1), 0);
        let ticks = clock.ticks();

        let report = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id())
            .run(&CancelToken::new());

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(ticks.load(Ordering::Acquire), 0);
        assert!(received_ticks(&bus, observer).is_empty());
    }

    #[test]
    fn stops_on_crash_notice() {
        let bus = Arc::new(MessageBus::new());
        let clock = TimeService::new(Duration::from_millis(5), 10_000);
        let ticks = clock.ticks();
        let mut worker = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id());
        worker.start().unwrap();

        let handle = thread::spawn(move || worker.run(&CancelToken::new()));
        thread::sleep(Duration::from_millis(30));
        bus.send_broadcast(Crashed {
            sender: WorkerId::new(99),
            name: String::from("Faulty"),
            reason: String::from("boom"),
        });
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, Outcome::Completed);
        assert!(ticks.load(Ordering::Acquire) < 10_000);
    }

    #[test]
    fn stops_when_every_watched_worker_terminated() {
        let bus = Arc::new(MessageBus::new());
        let (first, second) = (WorkerId::new(50), WorkerId::new(51));
        let clock = TimeService::new(Duration::from_millis(5), 10_000).watch([first, second]);
        let ticks = clock.ticks();
        let mut worker = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id());
        worker.start().unwrap();

        let handle = thread::spawn(move || worker.run(&CancelToken::new()));
        thread::sleep(Duration::from_millis(20));
        for sender in [first, second] {
            bus.send_broadcast(Terminated {
                sender,
                name: String::from("Done"),
            });
        }
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, Outcome::Completed);
        assert!(ticks.load(Ordering::Acquire) < 10_000);
    }
}
