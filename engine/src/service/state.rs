/// Lifecycle of a worker. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed but not yet registered with the bus.
    Created,
    /// Registered, initialized and consuming its inbox.
    Running,
    /// Finished; the worker is no longer registered.
    Terminated,
}

impl State {
    /// Returns `true` if moving to `next` goes forward in the lifecycle.
    pub fn can_become(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Created, State::Running)
                | (State::Created, State::Terminated)
                | (State::Running, State::Terminated)
        )
    }
}
