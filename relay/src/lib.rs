//! Stream coordination primitives for observing concurrently produced values.
//!
//! The core lives in [`chans`]: a [`Broadcaster`] fanning values out to
//! subscribers, an [`Accumulator`] snapshotting a stream, and a [`Waiter`] blocking
//! until a stream yields a matching value. The remaining modules are small
//! collaborators built on top of them:
//!
//! - [`mail`]: mail sender seam with a recording test double.
//! - [`logger`]: a `log` backend publishing records onto a broadcaster.
//! - [`testing`]: polling assertions for asynchronously settling state.

pub mod chans;
pub mod logger;
pub mod mail;
pub mod testing;

pub use chans::{
    Accumulator, Broadcaster, Config, Overflow, Resolution, Source, Subscription, SubscriptionId,
    Waiter,
};
