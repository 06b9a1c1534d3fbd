//! Fan-out of a single stream of values to many subscribers.
//!
//! [`Broadcaster`] keeps a set of active subscriber queues. Every value passed to
//! [`send()`](Broadcaster::send) is cloned into each queue that is active at the
//! time of the call.
//!
//! # Delivery policy
//!
//! Each subscriber gets its own bounded queue (default [`DEFAULT_CAPACITY`]). What
//! happens when a queue is full is fixed per broadcaster by [`Overflow`]:
//!
//! - [`Overflow::Block`] (default): `send` parks until the slow subscriber makes room.
//!   No value is ever lost, but one stalled subscriber stalls every producer.
//! - [`Overflow::DropOldest`]: the oldest buffered value of that subscriber is
//!   discarded to make room. `send` never parks.
//! - [`Overflow::DropNewest`]: the value is not delivered to that subscriber. `send`
//!   never parks.
//!
//! # Locking
//!
//! The subscriber set sits behind a single `RwLock`. A fan-out pass holds the read
//! lock for its whole duration, while register/unregister/close take the write lock.
//! A subscriber therefore either receives a value or was not active when it was
//! sent; the sending half of a queue is only dropped after it has been removed from
//! the set, so a fan-out never writes to a closed queue.
//!
//! Under [`Overflow::Block`] a `send` parked on a full queue still holds the read
//! lock. Every subscriber carries a release signal, and the broadcaster a halt
//! signal, which unregister and close drop *before* taking the write lock. The
//! parked `send` wakes up, skips that subscriber and lets the removal through.
//!
//! Dropping a [`Subscription`] unregisters it.
//!
//! # Ordering
//!
//! Per subscriber, values arrive in the order `send` was called. Nothing is
//! guaranteed across subscribers or across broadcasters.

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError, select};
use log::{debug, trace};

use crate::chans::{Release, Subscription, SubscriptionId, Waiter};

/// Queue capacity used by [`Broadcaster::new`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// What `send` does when a subscriber queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Park the sender until the subscriber makes room.
    #[default]
    Block,
    /// Discard the oldest buffered value of the subscriber.
    DropOldest,
    /// Skip the subscriber for this value.
    DropNewest,
}

/// Broadcaster configuration.
///
/// ```rust,ignore
/// let config = Config::default()
///     .with_capacity(64)
///     .with_overflow(Overflow::DropOldest);
/// let broadcaster = Broadcaster::<String>::with_config(config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Per-subscriber queue capacity. Clamped to at least 1.
    pub capacity: usize,
    /// Policy applied when a subscriber queue is full.
    pub overflow: Overflow,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow: Overflow::default(),
        }
    }
}

impl Config {
    /// Set the per-subscriber queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }
}

/// The broadcaster's end of one subscriber queue.
struct Outlet<T> {
    sender: Sender<T>,
    /// Second receiver on the same queue, only kept for [`Overflow::DropOldest`] so
    /// the broadcaster can evict the oldest value itself.
    evict: Option<Receiver<T>>,
    /// Disconnects when the subscriber is being removed.
    released: Receiver<()>,
}

struct State<T> {
    outlets: HashMap<SubscriptionId, Outlet<T>>,
    closed: bool,
}

struct Shared<T> {
    state: RwLock<State<T>>,

    /// Sending halves of the outlets' release signals. Kept outside `state` so they
    /// can be dropped while a fan-out pass holds the read lock.
    releases: Mutex<HashMap<SubscriptionId, Sender<()>>>,

    /// Dropped by `close` to release every parked send at once.
    halt: Mutex<Option<Sender<()>>>,
    halted: Receiver<()>,

    next_id: AtomicU64,
    config: Config,
}

impl<T> Shared<T> {
    fn read(&self) -> RwLockReadGuard<'_, State<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn releases(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Sender<()>>> {
        self.releases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Release for Shared<T> {
    fn release(&self, id: SubscriptionId) -> bool {
        // Wake a send parked on this queue before waiting for the write lock.
        drop(self.releases().remove(&id));

        let removed = self.write().outlets.remove(&id);
        match removed {
            Some(outlet) => {
                drop(outlet);
                debug!("unregistered subscriber {id}");
                true
            }
            None => {
                trace!("unregister {id}: not an active subscriber");
                false
            }
        }
    }
}

/// Forwards every value sent to it to all currently registered subscribers.
///
/// `Broadcaster` is a cheap handle: clones share the same subscriber set, so it can
/// be handed to any number of producer threads. When the last clone is dropped all
/// subscriber streams end, exactly as if [`close()`](Self::close) had been called.
///
/// # Lifecycle
///
/// ```text
///   new ──register/unregister/send──► (open) ──close──► (closed, terminal)
/// ```
///
/// Once closed, `send` delivers to nobody and `register` returns a subscription
/// whose stream is already at end-of-stream.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create a broadcaster with [`Config::default`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a broadcaster with a custom queue capacity and overflow policy.
    pub fn with_config(config: Config) -> Self {
        let config = Config {
            capacity: config.capacity.max(1),
            ..config
        };
        let (halt, halted) = channel::bounded(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    outlets: HashMap::new(),
                    closed: false,
                }),
                releases: Mutex::new(HashMap::new()),
                halt: Mutex::new(Some(halt)),
                halted,
                next_id: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// The configuration this broadcaster was created with.
    #[inline]
    pub fn config(&self) -> Config {
        self.shared.config
    }

    /// Register a new subscriber.
    ///
    /// The returned stream receives every value sent after this call returns, until
    /// it is unregistered (or dropped) or the broadcaster is closed. Registering on
    /// a closed broadcaster returns a subscription that is already at end-of-stream.
    pub fn register(&self) -> Subscription<T> {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = channel::bounded(self.shared.config.capacity);
        let (release, released) = channel::bounded(0);

        {
            let mut state = self.shared.write();
            if state.closed {
                debug!("register {id} on closed broadcaster, returning a closed stream");
                return Subscription::detached(id, receiver);
            }

            let evict = match self.shared.config.overflow {
                Overflow::DropOldest => Some(receiver.clone()),
                Overflow::Block | Overflow::DropNewest => None,
            };
            state.outlets.insert(
                id,
                Outlet {
                    sender,
                    evict,
                    released,
                },
            );
            self.shared.releases().insert(id, release);
            debug!(
                "registered subscriber {id} ({} active)",
                state.outlets.len()
            );
        }

        let owner: Weak<dyn Release> = Arc::downgrade(&self.shared) as Weak<Shared<T>>;
        Subscription::registered(id, receiver, owner)
    }

    /// Remove a subscriber and close its stream.
    ///
    /// Readers blocked on the stream observe end-of-stream once it is drained. A
    /// `send` parked on the subscriber's full queue gives up on it. Returns `true`
    /// if the subscriber was active; unknown or already removed ids are a no-op
    /// returning `false`.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.shared.release(id)
    }

    /// Send a value to every active subscriber.
    ///
    /// Returns the number of subscribers that accepted the value. With
    /// [`Overflow::Block`] this may park until every subscriber has room, or until
    /// the full subscriber is unregistered or the broadcaster closed. Sending on a
    /// closed broadcaster is a no-op returning `0`.
    pub fn send(&self, value: T) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();
        {
            let state = self.shared.read();
            if state.closed {
                trace!("send on closed broadcaster dropped");
                return 0;
            }

            for (id, outlet) in state.outlets.iter() {
                match self.deliver(outlet, value.clone()) {
                    Delivery::Accepted => delivered += 1,
                    Delivery::Dropped => trace!("subscriber {id} full, value dropped"),
                    Delivery::Released => trace!("subscriber {id} released during send"),
                    Delivery::Abandoned => stale.push(*id),
                }
            }
        }

        // Queues whose every receiver is gone are pruned outside the fan-out pass.
        for id in stale {
            if self.shared.release(id) {
                debug!("pruned abandoned subscriber {id}");
            }
        }

        delivered
    }

    fn deliver(&self, outlet: &Outlet<T>, value: T) -> Delivery {
        match self.shared.config.overflow {
            Overflow::Block => select! {
                send(outlet.sender, value) -> sent => match sent {
                    Ok(()) => Delivery::Accepted,
                    Err(_) => Delivery::Abandoned,
                },
                recv(outlet.released) -> _ => Delivery::Released,
                recv(self.shared.halted) -> _ => Delivery::Released,
            },
            Overflow::DropNewest => match outlet.sender.try_send(value) {
                Ok(()) => Delivery::Accepted,
                Err(TrySendError::Full(_)) => Delivery::Dropped,
                Err(TrySendError::Disconnected(_)) => Delivery::Abandoned,
            },
            Overflow::DropOldest => {
                let mut value = value;
                loop {
                    match outlet.sender.try_send(value) {
                        Ok(()) => return Delivery::Accepted,
                        Err(TrySendError::Full(rejected)) => {
                            if let Some(evict) = &outlet.evict {
                                let _ = evict.try_recv();
                            }
                            value = rejected;
                        }
                        Err(TrySendError::Disconnected(_)) => return Delivery::Abandoned,
                    }
                }
            }
        }
    }

    /// Unregister every subscriber and stop accepting values. Idempotent.
    ///
    /// Sends parked on a full queue are released first, so this never waits on a
    /// subscriber that stopped reading.
    pub fn close(&self) {
        drop(
            self.shared
                .halt
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let mut state = self.shared.write();
        if state.closed {
            return;
        }
        state.closed = true;
        let count = state.outlets.len();
        state.outlets.clear();
        self.shared.releases().clear();
        debug!("broadcaster closed, {count} subscribers released");
    }

    /// Returns `true` once [`close()`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.read().closed
    }

    /// Returns `true` if `id` is currently an active subscriber.
    pub fn is_registered(&self, id: SubscriptionId) -> bool {
        self.shared.read().outlets.contains_key(&id)
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.read().outlets.len()
    }

    /// Register a subscriber and wait on it for a value matching `predicate`.
    ///
    /// The subscriber is unregistered when the returned waiter's `wait` returns.
    /// Only values sent after this call are considered.
    pub fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Waiter<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let subscription = self.register();
        let id = subscription.id();
        let broadcaster = self.clone();
        Waiter::with_cleanup(subscription, predicate, timeout, move || {
            broadcaster.unregister(id);
        })
    }
}

enum Delivery {
    Accepted,
    Dropped,
    /// The subscriber is being unregistered or the broadcaster closed.
    Released,
    /// Every receiver of the queue is gone.
    Abandoned,
}
