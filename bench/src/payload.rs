//! Event payloads used across benchmarks.
//!
//! Sizes are chosen to be representative of domain events pushed through a
//! broadcaster: a small fixed header plus a variable body.

use std::time::Instant;

use rand::Rng;

/// A benchmark event stamped with its send time.
#[derive(Clone, Debug)]
pub struct Event {
    pub id: u64,
    pub sent_at: Instant,
    pub body: Vec<u8>,
}

impl Event {
    /// Event with an empty body.
    pub fn empty(id: u64) -> Self {
        Self {
            id,
            sent_at: Instant::now(),
            body: Vec::new(),
        }
    }
}

/// Generates events with random bodies of `min..=max` bytes.
pub struct PayloadGen<R: Rng> {
    rng: R,
    next_id: u64,
    min: usize,
    max: usize,
}

impl<R: Rng> PayloadGen<R> {
    pub fn new(rng: R, min: usize, max: usize) -> Self {
        assert!(min <= max, "payload min must not exceed max");
        Self {
            rng,
            next_id: 0,
            min,
            max,
        }
    }

    /// Produce the next event, stamped now.
    pub fn next_event(&mut self) -> Event {
        let len = self.rng.gen_range(self.min..=self.max);
        let mut body = vec![0u8; len];
        self.rng.fill(body.as_mut_slice());
        let id = self.next_id;
        self.next_id += 1;
        Event {
            id,
            sent_at: Instant::now(),
            body,
        }
    }

    /// Produce `count` events.
    pub fn batch(&mut self, count: usize) -> Vec<Event> {
        (0..count).map(|_| self.next_event()).collect()
    }
}
