use std::thread::{Builder, JoinHandle};

use crossbeam::{channel::Sender, sync::WaitGroup};
use log::trace;

use crate::{
    bus::WorkerId,
    core::CancelToken,
    runner::RunnerError,
    service::{Runnable, WorkerReport},
};

/// Signals the runner when a worker thread exits, including by panic.
struct ExitSignal {
    id: WorkerId,
    sender: Sender<WorkerId>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        // The runner may already have stopped listening.
        let _ = self.sender.send(self.id);
    }
}

/// A named OS thread driving one worker.
pub(crate) struct WorkerThread {
    id: WorkerId,
    name: String,
    handle: JoinHandle<WorkerReport>,
}

impl WorkerThread {
    /// Spawn a thread that starts `worker`, releases `ready`, and runs it until it exits.
    ///
    /// `ready` is dropped once the worker's subscriptions are in place, even if starting it
    /// failed or panicked, so a runner waiting on the barrier is never stranded.
    pub fn spawn(
        mut worker: Box<dyn Runnable>,
        ready: Option<WaitGroup>,
        cancel: CancelToken,
        exited: Sender<WorkerId>,
    ) -> Result<Self, RunnerError> {
        let id = worker.id();
        let name = worker.name().to_owned();

        let handle = Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exit = ExitSignal {
                    id,
                    sender: exited,
                };
                if let Err(err) = worker.start() {
                    trace!("{id} start failed: {err}");
                }
                drop(ready);
                worker.run(&cancel)
            })
            .map_err(|source| RunnerError::Spawn {
                name: name.clone(),
                source,
            })?;

        Ok(Self { id, name, handle })
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Wait for the thread to finish. A panicked worker yields `Err` with its id and name.
    pub fn join(self) -> Result<WorkerReport, (WorkerId, String)> {
        self.handle.join().map_err(|_| (self.id, self.name))
    }
}
