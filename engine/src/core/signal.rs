//! One-shot signalling primitives shared by futures and worker loops.
//!
//! Both types are built on the same trick: a crossbeam channel whose only sender is dropped to
//! fire the signal. A disconnected channel wakes every blocked receiver at once, stays
//! "ready" forever after, and can be combined with other channels in a `select!`.

use std::{fmt, sync::Arc, time::Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

/// Uninhabited payload; nothing is ever sent over a latch channel.
pub enum Never {}

/// A one-shot, many-waiter signal.
///
/// A latch starts open and can be fired exactly once. Firing wakes every thread blocked in
/// [`wait`](Self::wait) and makes every later wait return immediately.
pub struct Latch {
    trigger: Mutex<Option<Sender<Never>>>,
    signal: Receiver<Never>,
}

impl Latch {
    /// Create an unfired latch.
    pub fn new() -> Self {
        let (trigger, signal) = channel::bounded(0);
        Self {
            trigger: Mutex::new(Some(trigger)),
            signal,
        }
    }

    /// Fire the latch. Returns `false` if it had already been fired.
    pub fn fire(&self) -> bool {
        self.trigger.lock().take().is_some()
    }

    /// Returns `true` once the latch has been fired.
    pub fn is_fired(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block until the latch fires.
    pub fn wait(&self) {
        // `Never` is uninhabited, so `recv` can only return once the sender is gone.
        let _ = self.signal.recv();
    }

    /// Block until the latch fires or the deadline passes. Returns `true` if it fired.
    pub fn wait_deadline(&self, deadline: Instant) -> bool {
        match self.signal.recv_deadline(deadline) {
            Ok(never) => match never {},
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// The underlying receiver, for use in `crossbeam::channel::select!`.
    ///
    /// The receiver becomes ready (disconnected) when the latch fires.
    pub fn receiver(&self) -> &Receiver<Never> {
        &self.signal
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// A clonable cancellation handle.
///
/// Every clone observes the same state: cancelling one cancels all of them. Blocking waits in
/// the bus and in [`Future`](crate::bus::Future) accept a token and return early once it is
/// cancelled, which is how worker threads are asked to stop without thread interrupts.
#[derive(Clone, Default)]
pub struct CancelToken {
    latch: Arc<Latch>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.latch.fire();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.latch.is_fired()
    }

    /// Block until the token is cancelled.
    pub fn cancelled(&self) {
        self.latch.wait();
    }

    pub(crate) fn receiver(&self) -> &Receiver<Never> {
        self.latch.receiver()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn latch_fires_once() {
        let latch = Latch::new();
        assert!(!latch.is_fired());

        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }

    #[test]
    fn wait_returns_after_fire() {
        let latch = Arc::new(Latch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait())
        };

        thread::sleep(Duration::from_millis(20));
        latch.fire();

        waiter.join().unwrap();
        assert!(latch.is_fired());
    }

    #[test]
    fn wait_deadline_times_out_when_unfired() {
        let latch = Latch::new();
        let start = Instant::now();

        assert!(!latch.wait_deadline(start + Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        token.cancel();

        assert!(clone.is_cancelled());
        clone.cancelled();
    }
}
