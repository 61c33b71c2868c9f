//! The central broker that owns every inbox and subscriber roster.
//!
//! # Overview
//!
//! [`MessageBus`] is shared by every worker (through an `Arc`) and never runs a thread of its
//! own: each operation executes on the calling worker's thread.
//!
//! - **Registration**: every worker gets one FIFO inbox, created by
//!   [`register`](MessageBus::register) and torn down by [`unregister`](MessageBus::unregister).
//! - **Subscriptions**: per message type, a roster of interested workers. Event rosters also
//!   carry the round-robin cursor.
//! - **Routing**: [`send_event`](MessageBus::send_event) picks the next live roster member;
//!   [`send_broadcast`](MessageBus::send_broadcast) copies the roster and delivers to all.
//! - **Results**: pending events map to their [`Future`] until
//!   [`complete`](MessageBus::complete) resolves and evicts them.
//!
//! # Locking
//!
//! There is no global lock. The inbox table, the roster tables and the pending table are
//! sharded `DashMap`s, and each roster sits behind its own lock, so traffic on different
//! message types never contends on the same mutex. Locks are always taken roster first, inbox
//! shard second, and `unregister` never holds one roster lock while taking another.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use crossbeam::channel::{TryRecvError, select};
use dashmap::{DashMap, mapref::entry::Entry};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    bus::{
        Broadcast, BusError, Envelope, Event, EventId, Future, Inbound, Message, MessageKind,
        StatsSnapshot, WorkerId, inbox::Inbox, roster::Roster, stats::BusStats,
    },
    core::CancelToken,
};

/// Type-erased `Future<E::Output>` waiting in the pending table.
type PendingResult = Box<dyn Any + Send + Sync>;

/// Thread-safe broker for events and broadcasts.
///
/// Construct one per running system and hand an `Arc` of it to every worker.
///
/// ```rust,ignore
/// let bus = Arc::new(MessageBus::new());
/// let worker = bus.next_worker_id();
/// bus.register(worker);
/// bus.subscribe_event::<Checksum>(worker)?;
///
/// let future = bus.send_event(Checksum { bytes }).expect("someone is listening");
/// ```
pub struct MessageBus {
    inboxes: DashMap<WorkerId, Inbox>,
    event_rosters: DashMap<TypeId, Arc<Mutex<Roster>>>,
    broadcast_rosters: DashMap<TypeId, Arc<RwLock<Roster>>>,
    /// The kind each message type was first subscribed as.
    ///
    /// Claims are never released. A subscribe that loses a race with `unregister` after
    /// claiming still fixes the kind of its message type.
    kinds: DashMap<TypeId, MessageKind>,
    pending: DashMap<EventId, PendingResult>,
    next_event: AtomicU64,
    next_worker: AtomicU32,
    stats: BusStats,
}

impl MessageBus {
    /// Create a bus with no workers and no subscriptions.
    pub fn new() -> Self {
        Self {
            inboxes: DashMap::new(),
            event_rosters: DashMap::new(),
            broadcast_rosters: DashMap::new(),
            kinds: DashMap::new(),
            pending: DashMap::new(),
            next_event: AtomicU64::new(1),
            next_worker: AtomicU32::new(1),
            stats: BusStats::default(),
        }
    }

    /// Allocate a worker id that no other caller of this method will receive.
    pub fn next_worker_id(&self) -> WorkerId {
        WorkerId::new(self.next_worker.fetch_add(1, Ordering::Relaxed))
    }

    // ==================== Registration ====================

    /// Create an inbox for `id`.
    ///
    /// Returns `false` (and keeps the existing inbox) if the worker is already registered.
    pub fn register(&self, id: WorkerId) -> bool {
        match self.inboxes.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Inbox::new());
                debug!("registered {id}");
                true
            }
        }
    }

    /// Remove `id`'s inbox and drop it from every roster.
    ///
    /// Events still queued for the worker are rerouted to the remaining subscribers of their
    /// type; queued broadcasts are dropped. A thread blocked in
    /// [`await_message`](Self::await_message) for this worker wakes with
    /// [`BusError::Disconnected`]. Unregistering an unknown worker does nothing.
    pub fn unregister(&self, id: WorkerId) {
        let Some((_, inbox)) = self.inboxes.remove(&id) else {
            return;
        };

        // Senders that still find `id` in a roster skip it now that the inbox is gone.
        for roster in self.event_roster_handles() {
            roster.lock().remove(id);
        }
        for roster in self.broadcast_roster_handles() {
            roster.write().remove(id);
        }

        let leftovers = inbox.drain();
        drop(inbox);

        let mut rerouted = 0;
        for envelope in leftovers.into_iter().filter(Envelope::is_event) {
            if self.reroute(envelope) {
                rerouted += 1;
            }
        }
        debug!("unregistered {id} ({rerouted} queued events rerouted)");
    }

    /// Returns `true` if `id` currently has an inbox.
    pub fn is_registered(&self, id: WorkerId) -> bool {
        self.inboxes.contains_key(&id)
    }

    // ==================== Subscription ====================

    /// Add `id` to the roster for event type `E`.
    ///
    /// Subscribing twice is a no-op; a worker appears at most once per roster.
    pub fn subscribe_event<E: Event>(&self, id: WorkerId) -> Result<(), BusError> {
        self.ensure_registered(id)?;
        self.claim_kind::<E>(MessageKind::Event)?;

        let roster = Arc::clone(&self.event_rosters.entry(TypeId::of::<E>()).or_default());
        if roster.lock().insert(id) {
            debug!("{id} subscribed to event {}", type_name::<E>());
        }

        // Lost a race with `unregister`: do not leave a member without an inbox behind.
        if !self.is_registered(id) {
            roster.lock().remove(id);
            return Err(BusError::NotRegistered(id));
        }
        Ok(())
    }

    /// Add `id` to the roster for broadcast type `B`.
    ///
    /// Subscribing twice is a no-op; a worker appears at most once per roster.
    pub fn subscribe_broadcast<B: Broadcast>(&self, id: WorkerId) -> Result<(), BusError> {
        self.ensure_registered(id)?;
        self.claim_kind::<B>(MessageKind::Broadcast)?;

        let roster = Arc::clone(&self.broadcast_rosters.entry(TypeId::of::<B>()).or_default());
        if roster.write().insert(id) {
            debug!("{id} subscribed to broadcast {}", type_name::<B>());
        }

        if !self.is_registered(id) {
            roster.write().remove(id);
            return Err(BusError::NotRegistered(id));
        }
        Ok(())
    }

    // ==================== Sending ====================

    /// Route `event` to the next subscriber of its type.
    ///
    /// Returns `None` when no registered worker subscribes to `E`; the event is dropped and this
    /// is not an error. Otherwise the returned future resolves once the handling worker calls
    /// [`complete`](Self::complete). An event still queued when its last subscriber unregisters
    /// is dropped and its future never resolves; see [`Future::get`].
    ///
    /// Successive sends of the same type rotate through the roster, sharing one cursor across
    /// all senders.
    pub fn send_event<E: Event>(&self, event: E) -> Option<Future<E::Output>> {
        let id = EventId::new(self.next_event.fetch_add(1, Ordering::Relaxed));
        let future = Future::new();

        // Registered before enqueueing so a fast handler always finds it.
        self.pending.insert(id, Box::new(future.clone()));

        match self.route(Envelope::event(id, event)) {
            Some(worker) => {
                self.stats.event_sent();
                trace!("{id} ({}) routed to {worker}", type_name::<E>());
                Some(future)
            }
            None => {
                self.pending.remove(&id);
                self.stats.event_undeliverable();
                debug!("no subscriber for event {}", type_name::<E>());
                None
            }
        }
    }

    /// Deliver `message` to every worker subscribed to `B` at the time of the call.
    ///
    /// Every recipient receives the same shared instance. Workers that subscribe after the
    /// roster is copied do not receive it; workers that unregister before delivery are
    /// skipped. Returns the number of inboxes the message was delivered to.
    pub fn send_broadcast<B: Broadcast>(&self, message: B) -> usize {
        let recipients = match self.broadcast_roster::<B>() {
            Some(roster) => roster.read().members().to_vec(),
            None => Vec::new(),
        };

        let message = Arc::new(message);
        let mut delivered = 0;
        for id in recipients {
            if let Some(inbox) = self.inboxes.get(&id) {
                inbox.push(Envelope::broadcast(Arc::clone(&message)));
                delivered += 1;
            }
        }

        self.stats.broadcast_sent(delivered);
        trace!("broadcast {} delivered to {delivered}", type_name::<B>());
        delivered
    }

    /// Resolve the future of a delivered event with `result`.
    ///
    /// The pending entry is removed, so completing the same event again (or an event whose
    /// entry is already gone) is a silent no-op that returns `false`.
    pub fn complete<E: Event>(&self, event: &Inbound<E>, result: E::Output) -> bool {
        let Some((_, pending)) = self.pending.remove(&event.id()) else {
            trace!("{} has no pending result", event.id());
            return false;
        };

        match pending.downcast::<Future<E::Output>>() {
            Ok(future) => {
                let resolved = future.resolve(result);
                if resolved {
                    self.stats.event_completed();
                }
                resolved
            }
            Err(_) => {
                warn!(
                    "{} pending result does not match {}",
                    event.id(),
                    type_name::<E>()
                );
                false
            }
        }
    }

    // ==================== Receiving ====================

    /// Block until `id`'s inbox holds a message and return the oldest one.
    ///
    /// # Errors
    ///
    /// - [`BusError::NotRegistered`] if `id` has no inbox.
    /// - [`BusError::Cancelled`] if `cancel` fires first.
    /// - [`BusError::Disconnected`] if the worker is unregistered while waiting.
    pub fn await_message(&self, id: WorkerId, cancel: &CancelToken) -> Result<Envelope, BusError> {
        // Clone the receiver so no map lock is held while blocking.
        let receiver = self
            .inboxes
            .get(&id)
            .map(|inbox| inbox.receiver())
            .ok_or(BusError::NotRegistered(id))?;

        if cancel.is_cancelled() {
            return Err(BusError::Cancelled);
        }

        select! {
            recv(receiver) -> envelope => envelope.map_err(|_| BusError::Disconnected(id)),
            recv(cancel.receiver()) -> _ => Err(BusError::Cancelled),
        }
    }

    /// Take the oldest message from `id`'s inbox without blocking.
    pub fn try_message(&self, id: WorkerId) -> Result<Option<Envelope>, BusError> {
        let inbox = self.inboxes.get(&id).ok_or(BusError::NotRegistered(id))?;
        match inbox.receiver().try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Disconnected(id)),
        }
    }

    // ==================== Introspection ====================

    /// Number of messages waiting in `id`'s inbox, or `None` if it is not registered.
    pub fn inbox_len(&self, id: WorkerId) -> Option<usize> {
        self.inboxes.get(&id).map(|inbox| inbox.len())
    }

    /// Current roster for event type `E`, in rotation order.
    pub fn event_subscribers<E: Event>(&self) -> Vec<WorkerId> {
        self.event_rosters
            .get(&TypeId::of::<E>())
            .map(|roster| roster.lock().members().to_vec())
            .unwrap_or_default()
    }

    /// Current roster for broadcast type `B`.
    pub fn broadcast_subscribers<B: Broadcast>(&self) -> Vec<WorkerId> {
        self.broadcast_roster::<B>()
            .map(|roster| roster.read().members().to_vec())
            .unwrap_or_default()
    }

    /// The kind `M` was registered as, if any worker subscribed to it.
    pub fn kind_of<M: Message>(&self) -> Option<MessageKind> {
        self.kinds.get(&TypeId::of::<M>()).map(|kind| *kind)
    }

    /// Number of sent events whose result has not been completed yet.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Number of registered workers.
    pub fn worker_count(&self) -> usize {
        self.inboxes.len()
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ==================== Internals ====================

    fn ensure_registered(&self, id: WorkerId) -> Result<(), BusError> {
        if self.is_registered(id) {
            Ok(())
        } else {
            Err(BusError::NotRegistered(id))
        }
    }

    fn claim_kind<M: Message>(&self, kind: MessageKind) -> Result<(), BusError> {
        let registered = *self.kinds.entry(TypeId::of::<M>()).or_insert(kind);
        if registered == kind {
            Ok(())
        } else {
            Err(BusError::KindConflict {
                type_name: type_name::<M>(),
                registered,
            })
        }
    }

    fn broadcast_roster<B: Broadcast>(&self) -> Option<Arc<RwLock<Roster>>> {
        self.broadcast_rosters
            .get(&TypeId::of::<B>())
            .map(|roster| Arc::clone(&roster))
    }

    fn event_roster_handles(&self) -> Vec<Arc<Mutex<Roster>>> {
        self.event_rosters
            .iter()
            .map(|roster| Arc::clone(roster.value()))
            .collect()
    }

    fn broadcast_roster_handles(&self) -> Vec<Arc<RwLock<Roster>>> {
        self.broadcast_rosters
            .iter()
            .map(|roster| Arc::clone(roster.value()))
            .collect()
    }

    /// Enqueue an event envelope onto the next live member of its roster.
    ///
    /// The roster stays locked while the envelope is pushed, so a concurrent `unregister`
    /// cannot interleave between choosing a worker and delivering to it.
    fn route(&self, envelope: Envelope) -> Option<WorkerId> {
        let roster = self
            .event_rosters
            .get(&envelope.message_type())
            .map(|roster| Arc::clone(roster.value()))?;
        let mut roster = roster.lock();

        for _ in 0..roster.len() {
            let candidate = roster.advance()?;
            if let Some(inbox) = self.inboxes.get(&candidate) {
                inbox.push(envelope);
                return Some(candidate);
            }
            trace!("skipping {candidate}: inbox already removed");
        }
        None
    }

    /// Hand a queued event from a departing worker to another subscriber.
    fn reroute(&self, envelope: Envelope) -> bool {
        let Some(id) = envelope.event_id() else {
            return false;
        };
        let type_name = envelope.type_name();

        match self.route(envelope) {
            Some(worker) => {
                self.stats.event_rerouted();
                debug!("{id} ({type_name}) rerouted to {worker}");
                true
            }
            None => {
                self.pending.remove(&id);
                self.stats.event_undeliverable();
                warn!("{id} ({type_name}) dropped: no remaining subscriber");
                false
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("workers", &self.inboxes.len())
            .field("event_types", &self.event_rosters.len())
            .field("broadcast_types", &self.broadcast_rosters.len())
            .field("pending_events", &self.pending.len())
            .finish()
    }
}
