//! Single-assignment result handles.

use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use crossbeam::channel::select;

use crate::{
    bus::FutureError,
    core::{CancelToken, Latch},
};

struct Shared<T> {
    value: OnceLock<T>,
    done: Latch,
}

/// A promised result that is resolved at most once.
///
/// `Future` is a cheap handle: clones share the same slot. The bus keeps one clone in its
/// pending-event table and hands another to the sender of the event; whichever worker handles
/// the event resolves it with [`MessageBus::complete`](crate::bus::MessageBus::complete).
///
/// The value is written before waiters are woken, so a reader either sees no value or the
/// complete value, never anything in between.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Future<T> {
    /// Create an unresolved future.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                value: OnceLock::new(),
                done: Latch::new(),
            }),
        }
    }

    /// Resolve the future with `value`.
    ///
    /// Only the first call has an effect; later calls return `false` and drop their value.
    /// Every thread blocked on this future (now or later) observes the first value.
    pub fn resolve(&self, value: T) -> bool {
        if self.shared.value.set(value).is_err() {
            return false;
        }
        self.shared.done.fire();
        true
    }

    /// Returns `true` once [`resolve`](Self::resolve) has taken effect. Never blocks.
    pub fn is_done(&self) -> bool {
        self.shared.value.get().is_some()
    }
}

impl<T: Clone> Future<T> {
    /// Returns the value if the future is resolved, without blocking.
    pub fn try_get(&self) -> Option<T> {
        self.shared.value.get().cloned()
    }

    /// Block until the future is resolved and return its value.
    ///
    /// # Blocking
    ///
    /// Nothing guarantees a future is ever resolved: an event dropped because its last
    /// subscriber unregistered leaves the sender's future pending forever. Prefer
    /// [`get_timeout`](Self::get_timeout) or [`get_cancellable`](Self::get_cancellable) unless
    /// the handling worker is known to outlive the wait.
    pub fn get(&self) -> T {
        loop {
            if let Some(value) = self.try_get() {
                return value;
            }
            self.shared.done.wait();
        }
    }

    /// Block until the future is resolved or `cancel` fires.
    ///
    /// Cancellation only abandons this wait; the future stays unresolved for other waiters.
    pub fn get_cancellable(&self, cancel: &CancelToken) -> Result<T, FutureError> {
        loop {
            if let Some(value) = self.try_get() {
                return Ok(value);
            }
            select! {
                recv(self.shared.done.receiver()) -> _ => {}
                recv(cancel.receiver()) -> _ => {
                    // A value that landed at the same instant still wins.
                    return self.try_get().ok_or(FutureError::Cancelled);
                }
            }
        }
    }

    /// Block until the future is resolved or `timeout` elapses.
    ///
    /// A timeout too large to express as a deadline waits without one.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, FutureError> {
        if let Some(value) = self.try_get() {
            return Ok(value);
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Ok(self.get());
        };
        loop {
            if let Some(value) = self.try_get() {
                return Ok(value);
            }
            if !self.shared.done.wait_deadline(deadline) {
                return self.try_get().ok_or(FutureError::Timeout);
            }
        }
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("value", &self.shared.value.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn new_future_is_unresolved() {
        let future = Future::<u32>::new();

        assert!(!future.is_done());
        assert_eq!(future.try_get(), None);
    }

    #[test]
    fn resolve_is_single_assignment() {
        let future = Future::new();

        assert!(future.resolve("first"));
        assert!(!future.resolve("second"));

        assert!(future.is_done());
        assert_eq!(future.get(), "first");
    }

    #[test]
    fn clones_share_the_result() {
        let future = Future::new();
        let clone = future.clone();

        clone.resolve(7);

        assert!(future.is_done());
        assert_eq!(future.get(), 7);
    }

    #[test]
    fn get_wakes_when_resolved_from_another_thread() {
        let future = Future::new();
        let resolver = {
            let future = future.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                future.resolve(String::from("ready"));
            })
        };

        assert_eq!(future.get(), "ready");
        resolver.join().unwrap();
    }

    #[test]
    fn all_concurrent_readers_observe_the_same_value() {
        let future = Future::new();
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let future = future.clone();
                thread::spawn(move || future.get())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        future.resolve(42u64);

        for reader in readers {
            assert_eq!(reader.join().unwrap(), 42);
        }
    }

    #[test]
    fn get_timeout_returns_timeout_when_never_resolved() {
        let future = Future::<u32>::new();
        let start = Instant::now();

        let result = future.get_timeout(Duration::from_millis(100));

        let elapsed = start.elapsed();
        assert_eq!(result, Err(FutureError::Timeout));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
        assert!(!future.is_done());
    }

    #[test]
    fn get_timeout_returns_value_resolved_before_deadline() {
        let future = Future::new();
        let resolver = {
            let future = future.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                future.resolve(5);
            })
        };

        assert_eq!(future.get_timeout(Duration::from_secs(5)), Ok(5));
        resolver.join().unwrap();
    }

    #[test]
    fn get_timeout_accepts_an_unbounded_duration() {
        let future = Future::new();
        future.resolve(1u32);

        assert_eq!(future.get_timeout(Duration::MAX), Ok(1));

        let pending = Future::new();
        let resolver = {
            let pending = pending.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pending.resolve(2u32);
            })
        };

        assert_eq!(pending.get_timeout(Duration::MAX), Ok(2));
        resolver.join().unwrap();
    }

    #[test]
    fn timeout_does_not_consume_a_later_resolution() {
        let future = Future::new();

        assert_eq!(
            future.get_timeout(Duration::from_millis(10)),
            Err(FutureError::Timeout)
        );
        future.resolve(1);

        assert_eq!(future.get_timeout(Duration::from_millis(10)), Ok(1));
    }

    #[test]
    fn cancelled_wait_leaves_future_unresolved() {
        let future = Future::<u32>::new();
        let cancel = CancelToken::new();
        let waiter = {
            let future = future.clone();
            let cancel = cancel.clone();
            thread::spawn(move || future.get_cancellable(&cancel))
        };

        thread::sleep(Duration::from_millis(20));
        cancel.cancel();

        assert_eq!(waiter.join().unwrap(), Err(FutureError::Cancelled));
        assert!(!future.is_done());

        future.resolve(3);
        assert_eq!(future.get(), 3);
    }

    #[test]
    fn resolved_future_ignores_cancellation() {
        let future = Future::new();
        let cancel = CancelToken::new();
        future.resolve(9);
        cancel.cancel();

        assert_eq!(future.get_cancellable(&cancel), Ok(9));
    }
}
