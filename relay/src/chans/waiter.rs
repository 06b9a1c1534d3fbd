//! Block until a stream produces a matching value.
//!
//! A [`Waiter`] consumes its source on a background thread and tests each value
//! against a predicate. The first match is written to a one-slot channel. The
//! caller of [`wait()`](Waiter::wait) parks on that channel with a deadline, so it
//! returns as soon as either a match arrives, the deadline passes, or the source
//! closes without a match.
//!
//! # Resolution
//!
//! ```text
//!                 ┌── match ────────────► Matched(value)
//!   Pending ──────┼── deadline ─────────► TimedOut
//!                 └── source closed ────► Closed
//! ```
//!
//! All three are terminal. `Closed` exists so that a source ending early is a
//! distinct, observable outcome; [`wait()`](Waiter::wait) folds it into `None`
//! together with `TimedOut`.
//!
//! The deadline is fixed when the waiter is created, not when `wait` is called. A
//! timeout too large to be represented as a deadline (e.g. [`Duration::MAX`]) means
//! no deadline at all.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, select};
use log::{trace, warn};

use crate::chans::Source;

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Terminal outcome of a [`Waiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// The predicate matched this value.
    Matched(T),
    /// The deadline passed without a match.
    TimedOut,
    /// The source closed without a match.
    Closed,
}

impl<T> Resolution<T> {
    /// Returns `true` for [`Resolution::Matched`].
    #[inline]
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    /// The matched value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Resolution::Matched(value) => Some(value),
            Resolution::TimedOut | Resolution::Closed => None,
        }
    }
}

/// Waits for the first value of a stream that satisfies a predicate.
///
/// # Example
///
/// ```rust,ignore
/// let (sender, receiver) = crossbeam::channel::unbounded();
/// let waiter = Waiter::new(receiver, |s: &String| s == "bar", Duration::from_millis(100));
///
/// sender.send("foo".to_string()).unwrap();
/// sender.send("bar".to_string()).unwrap();
///
/// assert_eq!(waiter.wait().as_deref(), Some("bar"));
/// ```
///
/// # Cleanup
///
/// A cleanup callback given to [`with_cleanup()`](Self::with_cleanup) runs exactly
/// once, on the calling thread, right before `wait` returns, whatever the outcome.
/// A waiter that is dropped without waiting never runs it.
pub struct Waiter<T> {
    /// One-slot result channel written by the listener on the first match.
    result: Receiver<T>,

    /// Dropped to tell the listener to stop consuming.
    cancel: Option<Sender<()>>,

    listener: Option<JoinHandle<()>>,

    /// `None` when the timeout overflows `Instant`.
    deadline: Option<Instant>,
    cleanup: Option<Cleanup>,
}

impl<T: Send + 'static> Waiter<T> {
    /// Start waiting on `source` for a value matching `predicate`, for at most
    /// `timeout`.
    pub fn new<P>(source: impl Into<Source<T>>, predicate: P, timeout: Duration) -> Self
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        Self::spawn(source.into(), predicate, timeout, None)
    }

    /// Like [`new()`](Self::new), and run `cleanup` when [`wait()`](Self::wait) returns.
    pub fn with_cleanup<P, C>(
        source: impl Into<Source<T>>,
        predicate: P,
        timeout: Duration,
        cleanup: C,
    ) -> Self
    where
        P: FnMut(&T) -> bool + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::spawn(source.into(), predicate, timeout, Some(Box::new(cleanup)))
    }

    fn spawn<P>(
        source: Source<T>,
        mut predicate: P,
        timeout: Duration,
        cleanup: Option<Cleanup>,
    ) -> Self
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let deadline = Instant::now().checked_add(timeout);
        let (result_tx, result) = channel::bounded(1);
        let (cancel, cancelled) = channel::bounded::<()>(0);

        let listener = thread::spawn(move || {
            loop {
                select! {
                    recv(source.receiver()) -> message => match message {
                        Ok(value) => {
                            if predicate(&value) {
                                let _ = result_tx.send(value);
                                return;
                            }
                        }
                        Err(_) => {
                            trace!("waiter source closed before a match");
                            return;
                        }
                    },
                    recv(cancelled) -> _ => return,
                }
            }
        });

        Self {
            result,
            cancel: Some(cancel),
            listener: Some(listener),
            deadline,
            cleanup,
        }
    }

    /// Park until a match, the deadline, or the source closing.
    ///
    /// Returns `Some(value)` on a match and `None` otherwise.
    pub fn wait(self) -> Option<T> {
        self.resolve().into_value()
    }

    /// Like [`wait()`](Self::wait), but reports why no value was found.
    pub fn resolve(mut self) -> Resolution<T> {
        let received = match self.deadline {
            Some(deadline) => self.result.recv_deadline(deadline),
            None => self
                .result
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        let resolution = match received {
            Ok(value) => Resolution::Matched(value),
            Err(RecvTimeoutError::Timeout) => Resolution::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Resolution::Closed,
        };
        self.stop_listener();

        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        resolution
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Cancel the listener and join it so the predicate never runs after `wait`.
    fn stop_listener(&mut self) {
        drop(self.cancel.take());
        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                warn!("waiter predicate panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{bounded, unbounded};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn is_bar(s: &String) -> bool {
        s == "bar"
    }

    // ==================== Resolution ====================

    #[test]
    fn resolves_first_match() {
        let (sender, receiver) = bounded(3);
        let waiter = Waiter::new(receiver, is_bar, TIMEOUT);

        sender.send(String::from("foo")).unwrap();
        sender.send(String::from("bar")).unwrap();

        assert_eq!(waiter.wait(), Some(String::from("bar")));
    }

    #[test]
    fn times_out_without_match() {
        let (sender, receiver) = bounded(3);
        let start = Instant::now();
        let waiter = Waiter::new(receiver, is_bar, TIMEOUT);

        sender.send(String::from("foo")).unwrap();

        assert_eq!(waiter.resolve(), Resolution::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed < TIMEOUT * 10, "waited {elapsed:?}");
    }

    #[test]
    fn source_closed_resolves_before_deadline() {
        let (sender, receiver) = unbounded();
        let waiter = Waiter::new(receiver, is_bar, Duration::from_secs(10));
        let start = Instant::now();

        sender.send(String::from("foo")).unwrap();
        drop(sender);

        assert_eq!(waiter.resolve(), Resolution::Closed);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn later_matches_are_ignored() {
        let (sender, receiver) = unbounded();
        let waiter = Waiter::new(receiver, |n: &u32| *n > 1, TIMEOUT);

        for n in 1..=5 {
            sender.send(n).unwrap();
        }

        assert_eq!(waiter.wait(), Some(2));
    }

    #[test]
    fn value_sent_before_wait_is_seen() {
        let (sender, receiver) = unbounded();
        let waiter = Waiter::new(receiver, |n: &u32| *n == 7, TIMEOUT);

        sender.send(7).unwrap();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(waiter.wait(), Some(7));
    }

    #[test]
    fn deadline_starts_at_creation() {
        let (_sender, receiver) = unbounded::<u32>();
        let waiter = Waiter::new(receiver, |_| true, Duration::from_millis(20));

        thread::sleep(Duration::from_millis(40));
        assert!(waiter.is_expired());

        let start = Instant::now();
        assert_eq!(waiter.resolve(), Resolution::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn resolution_helpers() {
        assert!(Resolution::Matched(1).is_matched());
        assert!(!Resolution::<u32>::TimedOut.is_matched());
        assert_eq!(Resolution::Matched(1).into_value(), Some(1));
        assert_eq!(Resolution::<u32>::Closed.into_value(), None);
    }

    // ==================== Cleanup ====================

    #[test]
    fn cleanup_runs_once_on_timeout() {
        let (sender, receiver) = bounded(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let waiter = Waiter::with_cleanup(receiver, is_bar, TIMEOUT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sender.send(String::from("foo")).unwrap();

        assert_eq!(waiter.wait(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_once_on_match() {
        let (sender, receiver) = bounded(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let waiter = Waiter::with_cleanup(receiver, is_bar, TIMEOUT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sender.send(String::from("bar")).unwrap();

        assert_eq!(waiter.wait(), Some(String::from("bar")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_on_calling_thread() {
        let (_sender, receiver) = unbounded::<u32>();
        let caller = thread::current().id();
        let (seen_tx, seen_rx) = unbounded();

        let waiter = Waiter::with_cleanup(receiver, |_| true, Duration::ZERO, move || {
            seen_tx.send(thread::current().id()).unwrap();
        });
        waiter.wait();

        assert_eq!(seen_rx.try_recv().unwrap(), caller);
    }

    #[test]
    fn dropped_waiter_skips_cleanup() {
        let (_sender, receiver) = unbounded::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let waiter = Waiter::with_cleanup(receiver, |_| true, TIMEOUT, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(waiter);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // ==================== Listener ====================

    #[test]
    fn predicate_not_called_after_wait_returns() {
        let (sender, receiver) = unbounded();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let waiter = Waiter::new(
            receiver,
            move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            },
            Duration::from_millis(20),
        );
        assert_eq!(waiter.wait(), None);
        let seen = calls.load(Ordering::SeqCst);

        // The listener is gone, and the source with it.
        assert!(sender.send(1).is_err());
        thread::sleep(Duration::from_millis(20));

        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn panicking_predicate_resolves_closed() {
        let (sender, receiver) = unbounded();
        let waiter = Waiter::new(
            receiver,
            |_: &u32| panic!("predicate failure"),
            Duration::from_secs(10),
        );

        sender.send(1).unwrap();

        assert_eq!(waiter.resolve(), Resolution::Closed);
    }

    // ==================== Unbounded timeout ====================

    #[test]
    fn maximal_timeout_never_expires() {
        let (sender, receiver) = unbounded();
        let waiter = Waiter::new(receiver, |n: &u32| *n == 3, Duration::MAX);
        assert!(!waiter.is_expired());

        for n in 1..=3 {
            sender.send(n).unwrap();
        }

        assert_eq!(waiter.resolve(), Resolution::Matched(3));
    }

    #[test]
    fn maximal_timeout_still_resolves_on_close() {
        let (sender, receiver) = unbounded::<u32>();
        let waiter = Waiter::new(receiver, |_| false, Duration::MAX);

        sender.send(1).unwrap();
        drop(sender);

        assert_eq!(waiter.resolve(), Resolution::Closed);
    }
}
