//! A `log` sink that publishes records onto a [`Broadcaster`].
//!
//! Installing [`BroadcastLogger`] turns the process log into a stream that tests can
//! capture with an [`Accumulator`](crate::chans::Accumulator) or wait on with a
//! [`Waiter`](crate::chans::Waiter):
//!
//! ```rust,ignore
//! let logs = BroadcastLogger::install(LevelFilter::Debug)?;
//! let waiter = logs.wait_for(|m| m.message.contains("ready"), Duration::from_secs(1));
//!
//! start_service();
//!
//! assert!(waiter.wait().is_some());
//! ```
//!
//! The logger's broadcaster drops the oldest buffered record for a subscriber that
//! falls behind, so logging never parks the thread that logs. Records emitted by
//! the broadcaster itself are not republished.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::chans::{Broadcaster, Config, Overflow, Subscription};

/// Target prefix of the records logged by the stream primitives themselves.
const SELF_TARGET: &str = concat!(env!("CARGO_CRATE_NAME"), "::chans");

/// One captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Publishes every enabled log record as a [`LogMessage`].
pub struct BroadcastLogger {
    level: LevelFilter,
    broadcaster: Broadcaster<LogMessage>,
}

impl BroadcastLogger {
    /// Create a logger publishing records at or above `level`.
    pub fn new(level: LevelFilter) -> Self {
        Self::with_broadcaster(
            level,
            Broadcaster::with_config(Config::default().with_overflow(Overflow::DropOldest)),
        )
    }

    /// Create a logger publishing onto an existing broadcaster.
    pub fn with_broadcaster(level: LevelFilter, broadcaster: Broadcaster<LogMessage>) -> Self {
        Self { level, broadcaster }
    }

    /// Install a new logger as the global `log` backend and return its broadcaster.
    ///
    /// Fails if a global logger has already been set.
    pub fn install(level: LevelFilter) -> Result<Broadcaster<LogMessage>, SetLoggerError> {
        let logger = Self::new(level);
        let broadcaster = logger.broadcaster.clone();
        log::set_boxed_logger(Box::new(logger))?;
        log::set_max_level(level);
        Ok(broadcaster)
    }

    /// The broadcaster records are published on.
    pub fn broadcaster(&self) -> &Broadcaster<LogMessage> {
        &self.broadcaster
    }

    /// Register a new subscriber on the log stream.
    pub fn subscribe(&self) -> Subscription<LogMessage> {
        self.broadcaster.register()
    }
}

impl Log for BroadcastLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && !metadata.target().starts_with(SELF_TARGET)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.broadcaster.send(LogMessage {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            });
        }
    }

    fn flush(&self) {}
}
