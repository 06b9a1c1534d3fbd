//! Snapshot of everything a stream has produced.
//!
//! [`Accumulator`] drains a stream on a background thread and stores each value in
//! a `DashMap` keyed by a per-accumulator sequence number. Reads go through the
//! sharded map and never take a lock that the consuming thread holds for long, so
//! [`get_all()`](Accumulator::get_all) can be called at any time without stalling
//! the producer.
//!
//! The accumulator owns no shutdown method: its thread exits when the source stream
//! is closed by its owner (for a [`Subscription`](super::Subscription), when it is
//! unregistered or the broadcaster is closed). A subscription handed to an
//! accumulator therefore stays registered until then.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;

use dashmap::DashMap;
use log::trace;

use crate::chans::Source;

/// Records every value received from a stream.
///
/// # Example
///
/// ```rust,ignore
/// let broadcaster = Broadcaster::new();
/// let capture = Accumulator::new(broadcaster.register());
///
/// broadcaster.send("a");
/// broadcaster.send("b");
///
/// // Values are stored asynchronously; poll for them.
/// assert!(eventually(Duration::from_millis(100), Duration::from_millis(5), || {
///     capture.len() == 2
/// }));
/// assert_eq!(capture.get_all(), vec!["a", "b"]);
/// ```
pub struct Accumulator<T> {
    /// Observed values keyed by arrival sequence. The key only orders the snapshot.
    values: Arc<DashMap<u64, T>>,

    /// Cleared by the consuming thread once the source has closed.
    attached: Arc<AtomicBool>,
}

impl<T: Clone + Send + Sync + 'static> Accumulator<T> {
    /// Attach to `source` and start consuming it immediately.
    pub fn new(source: impl Into<Source<T>>) -> Self {
        let source = source.into();
        let values = Arc::new(DashMap::new());
        let attached = Arc::new(AtomicBool::new(true));

        let store = Arc::clone(&values);
        let flag = Arc::clone(&attached);
        thread::spawn(move || {
            let mut sequence: u64 = 0;
            for value in source.receiver().iter() {
                store.insert(sequence, value);
                sequence += 1;
            }
            flag.store(false, Ordering::Release);
            trace!("accumulator source closed after {sequence} values");
        });

        Self { values, attached }
    }

    /// Copy of every value observed so far, in arrival order.
    ///
    /// Returns an empty vector if nothing has been received yet.
    pub fn get_all(&self) -> Vec<T> {
        let mut entries: Vec<(u64, T)> = self
            .values
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        entries.sort_unstable_by_key(|(sequence, _)| *sequence);
        entries.into_iter().map(|(_, value)| value).collect()
    }

    /// First observed value (in arrival order) matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        self.get_all().into_iter().find(|value| predicate(value))
    }

    /// Number of values observed so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been observed yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns `true` while the source stream is still open.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Accumulator<T> {
    /// Returns `true` if `value` has been observed.
    pub fn contains(&self, value: &T) -> bool {
        self.values.iter().any(|entry| entry.value() == value)
    }
}
