//! Delivery timing utilities for measuring send-to-receive latency.
//!
//! Each subscriber runs on its own thread and records how long every event took
//! to arrive, so the statistics expose the cost of fan-out and of slow consumers
//! under the different overflow policies.

use std::thread;
use std::time::Duration;

use relay::chans::{Broadcaster, Config};

use crate::payload::Event;

/// Statistics collected from delivery latency measurements.
#[derive(Debug, Clone)]
pub struct LatencyStats {
    /// Number of events received.
    pub count: usize,
    /// Minimum latency observed.
    pub min: Duration,
    /// Maximum latency observed.
    pub max: Duration,
    /// Sorted latencies for percentile calculations.
    sorted: Vec<Duration>,
}

impl LatencyStats {
    /// Create stats from a collection of latencies.
    pub fn from_times(times: Vec<Duration>) -> Self {
        let mut sorted = times;
        sorted.sort();

        Self {
            count: sorted.len(),
            min: sorted.first().copied().unwrap_or(Duration::ZERO),
            max: sorted.last().copied().unwrap_or(Duration::ZERO),
            sorted,
        }
    }

    /// Average latency.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.sorted.iter().sum::<Duration>() / self.count as u32
        }
    }

    /// Get a specific percentile (0-100).
    pub fn percentile(&self, p: usize) -> Duration {
        if self.sorted.is_empty() {
            return Duration::ZERO;
        }
        let p = p.min(100);
        let index = (self.sorted.len() * p / 100).min(self.sorted.len() - 1);
        self.sorted[index]
    }

    /// Median latency.
    pub fn median(&self) -> Duration {
        self.percentile(50)
    }

    /// 99th percentile.
    pub fn p99(&self) -> Duration {
        self.percentile(99)
    }
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events, avg: {:.1}us, p50: {:.1}us, p99: {:.1}us, max: {:.1}us",
            self.count,
            self.average().as_secs_f64() * 1e6,
            self.median().as_secs_f64() * 1e6,
            self.p99().as_secs_f64() * 1e6,
            self.max.as_secs_f64() * 1e6,
        )
    }
}

/// Send `events` through a broadcaster with `subscribers` consumer threads.
///
/// Each consumer sleeps `consumer_delay` per event to simulate a slow reader.
/// Returns one [`LatencyStats`] per subscriber.
pub fn measure_delivery(
    config: Config,
    subscribers: usize,
    events: Vec<Event>,
    consumer_delay: Duration,
) -> Vec<LatencyStats> {
    let broadcaster = Broadcaster::<Event>::with_config(config);

    let consumers: Vec<_> = (0..subscribers)
        .map(|_| {
            let subscription = broadcaster.register();
            thread::spawn(move || {
                let mut times = Vec::new();
                for event in subscription.iter() {
                    times.push(event.sent_at.elapsed());
                    if !consumer_delay.is_zero() {
                        thread::sleep(consumer_delay);
                    }
                }
                LatencyStats::from_times(times)
            })
        })
        .collect();

    for mut event in events {
        event.sent_at = std::time::Instant::now();
        broadcaster.send(event);
    }
    broadcaster.close();

    consumers
        .into_iter()
        .map(|consumer| consumer.join().expect("consumer thread panicked"))
        .collect()
}
