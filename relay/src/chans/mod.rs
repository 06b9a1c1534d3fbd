//! Stream coordination primitives.
//!
//! This module provides three small building blocks that are used together to
//! observe values produced concurrently on other threads:
//!
//! - [`Broadcaster`]: fans every value sent to it out to all registered subscribers.
//! - [`Accumulator`]: records everything a stream produces into a snapshot that can
//!   be read at any time.
//! - [`Waiter`]: blocks the caller until a stream produces a value matching a
//!   predicate, or until a deadline elapses.
//!
//! # Streams
//!
//! Every stream in this module is a [`crossbeam::channel::Receiver`]. Subscriber
//! streams are handed out as [`Subscription`]s, which pair the receiver with the
//! [`SubscriptionId`] needed to unregister it. Both the accumulator and the waiter
//! consume a [`Source`], built from either a subscription or a plain receiver.
//!
//! ```text
//!                      ┌──► Subscription ──► Accumulator (get_all)
//!  producer ──send──► Broadcaster
//!                      └──► Subscription ──► Waiter (wait)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use relay::chans::{Accumulator, Broadcaster, Waiter};
//!
//! let broadcaster = Broadcaster::<u32>::new();
//! let all = Accumulator::new(broadcaster.register());
//! let waiter = Waiter::new(broadcaster.register(), |v| *v > 1, Duration::from_secs(1));
//!
//! broadcaster.send(1);
//! broadcaster.send(2);
//!
//! assert_eq!(waiter.wait(), Some(2));
//! ```

pub mod broadcast;
pub mod capture;
pub mod waiter;

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};

pub use broadcast::{Broadcaster, Config, DEFAULT_CAPACITY, Overflow};
pub use capture::Accumulator;
pub use waiter::{Resolution, Waiter};

/// Opaque handle identifying a subscriber of a [`Broadcaster`].
///
/// Identifiers are unique per broadcaster and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owner of a subscriber set that can drop one of its members.
pub(crate) trait Release: Send + Sync {
    fn release(&self, id: SubscriptionId) -> bool;
}

/// Unregisters its subscriber when dropped.
struct Guard {
    id: SubscriptionId,
    owner: Weak<dyn Release>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release(self.id);
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("id", &self.id).finish()
    }
}

/// A subscriber stream returned by [`Broadcaster::register`].
///
/// The stream yields every value sent to the broadcaster while the subscription
/// is active, in send order. Once the subscription is unregistered (or the
/// broadcaster closed or dropped), readers drain whatever is still buffered and
/// then observe end-of-stream.
///
/// Dropping the subscription unregisters it. Handing it to an [`Accumulator`] or a
/// [`Waiter`] moves that responsibility along with the stream.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: Receiver<T>,
    guard: Option<Guard>,
}

impl<T> Subscription<T> {
    /// A stream that is not tied to any subscriber set.
    pub(crate) fn detached(id: SubscriptionId, receiver: Receiver<T>) -> Self {
        Self {
            id,
            receiver,
            guard: None,
        }
    }

    pub(crate) fn registered(
        id: SubscriptionId,
        receiver: Receiver<T>,
        owner: Weak<dyn Release>,
    ) -> Self {
        Self {
            id,
            receiver,
            guard: Some(Guard { id, owner }),
        }
    }

    /// The handle to pass to [`Broadcaster::unregister`].
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Borrow the underlying receiver, e.g. to use it in a `select!`.
    #[inline]
    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }

    /// Block until the next value arrives. Returns `None` once the stream is closed
    /// and drained.
    pub fn recv(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Take the next buffered value without blocking.
    ///
    /// Fails with [`TryRecvError::Empty`] while the stream is open but has nothing
    /// buffered, and with [`TryRecvError::Disconnected`] once it is closed and drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for at most `timeout` waiting for the next value.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator over the stream; ends when the stream is closed and drained.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.iter()
    }

    /// Returns `true` if nothing is currently buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Number of values currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// A stream consumed by an [`Accumulator`] or a [`Waiter`].
///
/// Built from a plain [`Receiver`] or from a [`Subscription`]. A subscription
/// stays registered for as long as its source is alive.
#[derive(Debug)]
pub struct Source<T> {
    receiver: Receiver<T>,
    _guard: Option<Guard>,
}

impl<T> Source<T> {
    #[inline]
    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
}

impl<T> From<Receiver<T>> for Source<T> {
    fn from(receiver: Receiver<T>) -> Self {
        Self {
            receiver,
            _guard: None,
        }
    }
}

impl<T> From<Subscription<T>> for Source<T> {
    fn from(subscription: Subscription<T>) -> Self {
        Self {
            receiver: subscription.receiver,
            _guard: subscription.guard,
        }
    }
}
