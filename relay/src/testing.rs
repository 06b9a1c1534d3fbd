//! Polling helpers for asserting on state that settles asynchronously.
//!
//! Values flowing through a [`Broadcaster`](crate::chans::Broadcaster) reach an
//! [`Accumulator`](crate::chans::Accumulator) on another thread, so tests poll for
//! the expected snapshot instead of sleeping for a fixed amount of time.

use std::thread;
use std::time::{Duration, Instant};

/// Poll `condition` every `tick` until it returns `true` or `timeout` elapses.
///
/// The condition is always evaluated at least once, and once more at the deadline.
/// Returns whether it was ever satisfied. A timeout too large to be represented as
/// a deadline polls until the condition holds.
pub fn eventually<F>(timeout: Duration, tick: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if condition() {
            return true;
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                tick.min(deadline - now)
            }
            None => tick,
        };
        thread::sleep(pause);
    }
}

/// Assert that a condition becomes true within a timeout.
///
/// ```rust,ignore
/// assert_eventually!(capture.len() == 3, Duration::from_millis(100), Duration::from_millis(10));
/// assert_eventually!(
///     capture.contains(&4),
///     Duration::from_millis(100),
///     Duration::from_millis(10),
///     "subscriber never saw {}",
///     4
/// );
/// ```
#[macro_export]
macro_rules! assert_eventually {
    ($cond:expr, $timeout:expr, $tick:expr $(,)?) => {
        assert!(
            $crate::testing::eventually($timeout, $tick, || $cond),
            "condition not met within {:?}: {}",
            $timeout,
            stringify!($cond)
        )
    };
    ($cond:expr, $timeout:expr, $tick:expr, $($arg:tt)+) => {
        assert!($crate::testing::eventually($timeout, $tick, || $cond), $($arg)+)
    };
}
