//! Runs a set of workers to completion.
//!
//! The [`Runner`] owns the startup and shutdown choreography around the bus:
//!
//! 1. The [`TimeService`] is registered first, so it observes every other worker's
//!    [`Terminated`](crate::service::Terminated) and [`Crashed`](crate::service::Crashed) notice.
//! 2. Every worker gets a named thread that registers and initializes it, then releases a
//!    startup barrier.
//! 3. Once all workers are subscribed the clock starts ticking on its own thread.
//! 4. When the clock stops, workers get [`RunnerConfig::shutdown_grace`] to terminate on their
//!    own before their waits are cancelled.

mod config;
mod error;
mod thread;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Instant,
};

use crossbeam::{channel::unbounded, sync::WaitGroup};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    bus::{MessageBus, StatsSnapshot, WorkerId},
    core::CancelToken,
    service::{MicroService, Runnable, TimeService, Worker},
};

pub use crate::service::{Outcome, WorkerReport};
pub use config::RunnerConfig;
pub use error::{ConfigError, RunnerError};

use thread::WorkerThread;

/// What happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The last tick the clock emitted.
    pub ticks: u64,
    /// One report per worker, the clock first.
    pub workers: Vec<WorkerReport>,
    pub stats: StatsSnapshot,
}

impl RunReport {
    /// The first worker that crashed, if any.
    pub fn crashed(&self) -> Option<&WorkerReport> {
        self.workers
            .iter()
            .find(|worker| matches!(worker.outcome, Outcome::Crashed { .. }))
    }

    /// Returns `true` if every worker terminated on its own.
    pub fn is_clean(&self) -> bool {
        self.workers
            .iter()
            .all(|worker| worker.outcome == Outcome::Completed)
    }
}

/// Owns the workers of one run and drives them on their own threads.
pub struct Runner {
    bus: Arc<MessageBus>,
    config: RunnerConfig,
    workers: Vec<Box<dyn Runnable>>,
}

impl Runner {
    pub fn new(bus: Arc<MessageBus>, config: RunnerConfig) -> Self {
        Self {
            bus,
            config,
            workers: Vec::new(),
        }
    }

    /// Add a worker to the run, returning the id it will have on the bus.
    pub fn add<S: MicroService>(&mut self, service: S) -> WorkerId {
        let id = self.bus.next_worker_id();
        self.workers
            .push(Box::new(Worker::new(service, Arc::clone(&self.bus), id)));
        id
    }

    #[inline]
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    #[inline]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every worker until the clock stops and the workers have shut down.
    ///
    /// # Errors
    ///
    /// Fails if the clock cannot be initialized or a worker thread cannot be spawned. Worker
    /// crashes and panics are not errors; they are recorded in the [`RunReport`].
    pub fn run(self) -> Result<RunReport, RunnerError> {
        let Runner {
            bus,
            config,
            workers,
        } = self;
        let cancel = CancelToken::new();

        let clock = TimeService::new(config.tick_interval(), config.duration)
            .watch(workers.iter().map(|worker| worker.id()));
        let ticks = clock.ticks();
        let clock = Worker::new(clock, Arc::clone(&bus), bus.next_worker_id());
        let clock = Self::start_inline(clock, &cancel)?;

        info!(
            "starting {} workers for {} ticks of {:?}",
            workers.len(),
            config.duration,
            config.tick_interval()
        );

        let (exited, exits) = unbounded();
        let ready = WaitGroup::new();
        let mut threads = Vec::with_capacity(workers.len());
        for worker in workers {
            match WorkerThread::spawn(worker, Some(ready.clone()), cancel.clone(), exited.clone())
            {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    error!("{err}");
                    cancel.cancel();
                    drop(ready);
                    clock.run(&cancel);
                    Self::join_all(&bus, threads);
                    return Err(err);
                }
            }
        }

        ready.wait();
        debug!("all workers initialized, starting the clock");

        let clock = match WorkerThread::spawn(Box::new(clock), None, cancel.clone(), exited) {
            Ok(clock) => clock,
            Err(err) => {
                error!("{err}");
                cancel.cancel();
                Self::join_all(&bus, threads);
                return Err(err);
            }
        };
        let clock_id = clock.id();
        let mut reports = Self::join_all(&bus, vec![clock]);

        // Wait for the remaining workers to terminate cooperatively.
        let deadline = Instant::now() + config.shutdown_grace();
        let mut running = threads.len();
        while running > 0 {
            match exits.recv_deadline(deadline) {
                Ok(id) if id == clock_id => {}
                Ok(_) => running -= 1,
                Err(_) => break,
            }
        }
        if running > 0 {
            warn!("{running} workers still running after the grace period, cancelling");
            cancel.cancel();
        }

        reports.extend(Self::join_all(&bus, threads));
        let report = RunReport {
            ticks: ticks.load(Ordering::Acquire),
            workers: reports,
            stats: bus.stats(),
        };
        info!(
            "run finished after {} ticks{}",
            report.ticks,
            if report.is_clean() { "" } else { " (unclean)" }
        );
        Ok(report)
    }

    /// Start `worker` on the calling thread.
    ///
    /// A worker that fails to start still runs its shutdown epilogue, so it has left the bus by
    /// the time the error is returned.
    fn start_inline<S: MicroService>(
        mut worker: Worker<S>,
        cancel: &CancelToken,
    ) -> Result<Worker<S>, RunnerError> {
        if let Err(source) = worker.start() {
            let name = worker.name().to_owned();
            worker.run(cancel);
            return Err(RunnerError::Startup { name, source });
        }
        Ok(worker)
    }

    fn join_all(bus: &MessageBus, threads: Vec<WorkerThread>) -> Vec<WorkerReport> {
        threads
            .into_iter()
            .map(|thread| match thread.join() {
                Ok(report) => report,
                Err((id, name)) => {
                    error!("{name} ({id}) panicked");
                    bus.unregister(id);
                    WorkerReport::panicked(id, name)
                }
            })
            .collect()
    }
}
