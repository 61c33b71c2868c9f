use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    bus::{BusError, Envelope, MessageBus, WorkerId},
    core::CancelToken,
    service::{Context, MicroService, ServiceError, Setup, State, Terminated, handlers::Handlers},
};

/// How a worker's run loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The worker terminated itself.
    Completed,
    /// The worker crashed, or failed to initialize.
    Crashed { reason: String },
    /// The wait was cancelled or the worker was removed from the bus before it terminated.
    Cancelled,
    /// The worker's thread panicked.
    Panicked,
}

/// Summary of one worker's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub name: String,
    pub outcome: Outcome,
    /// Messages that reached a handler.
    pub handled: u64,
}

impl WorkerReport {
    pub(crate) fn panicked(id: WorkerId, name: String) -> Self {
        Self {
            id,
            name,
            outcome: Outcome::Panicked,
            handled: 0,
        }
    }
}

/// A [`MicroService`] bound to the bus.
pub struct Worker<S: MicroService> {
    service: S,
    context: Context,
    handlers: Handlers<S>,
    state: State,
    handled: u64,
}

impl<S: MicroService> Worker<S> {
    pub fn new(service: S, bus: Arc<MessageBus>, id: WorkerId) -> Self {
        let name = service.name().to_owned();
        Self {
            service,
            context: Context::new(id, name, bus),
            handlers: Handlers::new(),
            state: State::Created,
            handled: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.context.id()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.context.name()
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Register with the bus and run [`MicroService::initialize`].
    ///
    /// Subscriptions made during initialization are live when this returns. If initialization
    /// fails the worker is crashed, and [`run`](Self::run) only performs the shutdown steps.
    /// Calling `start` on a worker that already left [`State::Created`] does nothing.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.state != State::Created || self.context.is_terminated() {
            return Ok(());
        }
        self.context.bus().register(self.id());

        let mut setup = Setup::new(&mut self.context, &mut self.handlers);
        match self.service.initialize(&mut setup) {
            Ok(()) => {
                debug!(
                    "{} ({}) initialized with {} handlers",
                    self.name(),
                    self.id(),
                    self.handlers.len()
                );
                self.transition(State::Running);
                Ok(())
            }
            Err(err) => {
                self.context.crash(err.to_string());
                Err(err)
            }
        }
    }

    /// Consume the inbox until the worker terminates or `cancel` fires, then leave the bus.
    ///
    /// Starts the worker first if [`start`](Self::start) was not called. However the loop
    /// ends, the worker calls [`MicroService::on_terminate`], broadcasts [`Terminated`] and
    /// unregisters.
    pub fn run(mut self, cancel: &CancelToken) -> WorkerReport {
        if let Err(err) = self.start() {
            warn!("{} ({}) failed to start: {err}", self.name(), self.id());
        }

        let mut interrupted = false;
        if self.state == State::Running && !self.context.is_terminated() {
            if cancel.is_cancelled() {
                interrupted = true;
            } else {
                info!("{} ({}) running", self.name(), self.id());
                self.service.on_start(&mut self.context);
                interrupted = self.consume(cancel);
            }
        }

        self.finish(interrupted)
    }

    /// Returns `true` if the loop ended without the worker terminating itself.
    fn consume(&mut self, cancel: &CancelToken) -> bool {
        let bus = Arc::clone(self.context.bus());
        while !self.context.is_terminated() {
            match bus.await_message(self.id(), cancel) {
                Ok(envelope) => self.dispatch(&envelope),
                Err(BusError::Cancelled) => {
                    debug!("{} ({}) cancelled", self.name(), self.id());
                    return true;
                }
                Err(err) => {
                    warn!("{} ({}) stopped receiving: {err}", self.name(), self.id());
                    return true;
                }
            }
        }
        false
    }

    fn dispatch(&mut self, envelope: &Envelope) {
        if self
            .handlers
            .dispatch(&mut self.service, &mut self.context, envelope)
        {
            self.handled += 1;
        } else {
            warn!(
                "{} ({}) has no handler for {}",
                self.name(),
                self.id(),
                envelope.type_name()
            );
        }
    }

    fn finish(mut self, interrupted: bool) -> WorkerReport {
        self.service.on_terminate(&mut self.context);
        self.context.terminate();
        self.transition(State::Terminated);

        let id = self.id();
        self.context.send_broadcast(Terminated {
            sender: id,
            name: self.name().to_owned(),
        });
        self.context.bus().unregister(id);

        let outcome = match (self.context.crash_reason(), interrupted) {
            (Some(reason), _) => Outcome::Crashed {
                reason: reason.to_owned(),
            },
            (None, true) => Outcome::Cancelled,
            (None, false) => Outcome::Completed,
        };
        info!(
            "{} ({id}) terminated after {} messages: {outcome:?}",
            self.name(),
            self.handled
        );

        WorkerReport {
            id,
            name: self.name().to_owned(),
            outcome,
            handled: self.handled,
        }
    }

    fn transition(&mut self, next: State) {
        if self.state.can_become(next) {
            self.state = next;
        }
    }
}

/// Object-safe view of a [`Worker`] so workers of different service types can share a list.
pub(crate) trait Runnable: Send {
    fn id(&self) -> WorkerId;
    fn name(&self) -> &str;
    fn start(&mut self) -> Result<(), ServiceError>;
    fn run(self: Box<Self>, cancel: &CancelToken) -> WorkerReport;
}

impl<S: MicroService> Runnable for Worker<S> {
    fn id(&self) -> WorkerId {
        Worker::id(self)
    }

    fn name(&self) -> &str {
        Worker::name(self)
    }

    fn start(&mut self) -> Result<(), ServiceError> {
        Worker::start(self)
    }

    fn run(self: Box<Self>, cancel: &CancelToken) -> WorkerReport {
        Worker::run(*self, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::{Broadcast, Event},
        service::Crashed,
    };
    use std::{thread, time::Duration};

    #[derive(Debug, Event)]
    #[event(output = u64)]
    struct Square(u64);

    #[derive(Debug, Broadcast)]
    struct Stop;

    #[derive(Debug, Broadcast)]
    struct Stray;

    #[derive(Default)]
    struct Squarer {
        started: bool,
        terminated: bool,
    }

    impl MicroService for Squarer {
        fn name(&self) -> &str {
            "Squarer"
        }

        fn initialize(&mut self, setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
            setup.subscribe_event::<Square, _>(|_, context, square| {
                context.complete(&square, square.0 * square.0);
            })?;
            setup.terminate_on::<Stop>()
        }

        fn on_start(&mut self, _context: &mut Context) {
            self.started = true;
        }

        fn on_terminate(&mut self, _context: &mut Context) {
            self.terminated = true;
        }
    }

    struct Broken;

    impl MicroService for Broken {
        fn name(&self) -> &str {
            "Broken"
        }

        fn initialize(&mut self, _setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
            Err(ServiceError::Init(String::from("missing input")))
        }
    }

    fn observer(bus: &MessageBus) -> WorkerId {
        let id = bus.next_worker_id();
        bus.register(id);
        bus.subscribe_broadcast::<Terminated>(id).unwrap();
        bus.subscribe_broadcast::<Crashed>(id).unwrap();
        id
    }

    #[test]
    fn start_registers_and_subscribes() {
        let bus = Arc::new(MessageBus::new());
        let mut worker = Worker::new(Squarer::default(), Arc::clone(&bus), bus.next_worker_id());

        worker.start().unwrap();

        assert_eq!(worker.state(), State::Running);
        assert!(bus.is_registered(worker.id()));
        assert_eq!(bus.event_subscribers::<Square>(), vec![worker.id()]);
    }

    #[test]
    fn start_twice_is_a_no_op() {
        let bus = Arc::new(MessageBus::new());
        let mut worker = Worker::new(Squarer::default(), Arc::clone(&bus), bus.next_worker_id());

        worker.start().unwrap();
        worker.start().unwrap();

        assert_eq!(bus.event_subscribers::<Square>().len(), 1);
    }

    #[test]
    fn worker_handles_events_until_terminated() {
        let bus = Arc::new(MessageBus::new());
        let watcher = observer(&bus);
        let mut worker = Worker::new(Squarer::default(), Arc::clone(&bus), bus.next_worker_id());
        worker.start().unwrap();
        let id = worker.id();

        let handle = thread::spawn(move || worker.run(&CancelToken::new()));
        let future = bus.send_event(Square(12)).unwrap();
        assert_eq!(future.get_timeout(Duration::from_secs(5)), Ok(144));
        bus.send_broadcast(Stop);
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.handled, 2);
        assert!(!bus.is_registered(id));

        let notice = bus
            .try_message(watcher)
            .unwrap()
            .unwrap()
            .downcast::<Terminated>()
            .unwrap();
        assert_eq!(notice.sender, id);
        assert_eq!(notice.name, "Squarer");
    }

    #[test]
    fn hooks_run_once_around_the_loop() {
        struct Hooked {
            calls: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        }

        impl MicroService for Hooked {
            fn name(&self) -> &str {
                "Hooked"
            }

            fn initialize(&mut self, _setup: &mut Setup<'_, Self>) -> Result<(), ServiceError> {
                self.calls.lock().push("initialize");
                Ok(())
            }

            fn on_start(&mut self, context: &mut Context) {
                self.calls.lock().push("start");
                context.terminate();
            }

            fn on_terminate(&mut self, _context: &mut Context) {
                self.calls.lock().push("terminate");
            }
        }

        let bus = Arc::new(MessageBus::new());
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let worker = Worker::new(
            Hooked {
                calls: Arc::clone(&calls),
            },
            Arc::clone(&bus),
            bus.next_worker_id(),
        );

        let report = worker.run(&CancelToken::new());

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(*calls.lock(), vec!["initialize", "start", "terminate"]);
    }

    #[test]
    fn failed_initialize_crashes_the_worker() {
        let bus = Arc::new(MessageBus::new());
        let watcher = observer(&bus);
        let mut worker = Worker::new(Broken, Arc::clone(&bus), bus.next_worker_id());
        let id = worker.id();

        assert_eq!(
            worker.start(),
            Err(ServiceError::Init(String::from("missing input")))
        );
        let report = worker.run(&CancelToken::new());

        assert_eq!(
            report.outcome,
            Outcome::Crashed {
                reason: String::from("initialization failed: missing input")
            }
        );
        assert!(!bus.is_registered(id));

        let crashed = bus.try_message(watcher).unwrap().unwrap();
        assert!(crashed.is::<Crashed>());
        let terminated = bus.try_message(watcher).unwrap().unwrap();
        assert!(terminated.is::<Terminated>());
    }

    #[test]
    fn cancellation_ends_a_blocked_worker() {
        let bus = Arc::new(MessageBus::new());
        let worker = Worker::new(Squarer::default(), Arc::clone(&bus), bus.next_worker_id());
        let id = worker.id();
        let cancel = CancelToken::new();

        let handle = {
            let cancel = cancel.clone();
            thread::spawn(move || worker.run(&cancel))
        };
        thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, Outcome::Cancelled);
        assert!(!bus.is_registered(id));
    }

    #[test]
    fn messages_without_a_handler_are_skipped() {
        let bus = Arc::new(MessageBus::new());
        let mut worker = Worker::new(Squarer::default(), Arc::clone(&bus), bus.next_worker_id());
        worker.start().unwrap();
        bus.subscribe_broadcast::<Stray>(worker.id()).unwrap();

        bus.send_broadcast(Stray);
        bus.send_broadcast(Stop);
        let report = worker.run(&CancelToken::new());

        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.handled, 1);
    }

    #[test]
    fn outcome_serializes_with_a_kind_tag() {
        let crashed = Outcome::Crashed {
            reason: String::from("boom"),
        };

        assert_eq!(
            serde_json::to_string(&crashed).unwrap(),
            r#"{"kind":"crashed","reason":"boom"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outcome::Completed).unwrap(),
            r#"{"kind":"completed"}"#
        );
    }
}
