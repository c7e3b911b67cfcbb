//! Frame source abstraction for groundlink.
//!
//! A frame source produces the raw byte stream the decoder consumes. Two
//! variants satisfy the same contract: a physical serial link
//! ([`serial::SerialSource`]) and a loopback TCP test channel
//! ([`loopback::LoopbackSource`]). The ingestion pipeline treats them
//! identically.

pub mod loopback;
pub mod serial;

use std::time::Duration;

use crate::config::{SourceConfig, SourceMode};
use crate::error::Result;

pub use loopback::LoopbackSource;
pub use serial::SerialSource;

/// How long a blocking read waits before returning empty, so the ingestion
/// loop can poll its shutdown signal.
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Connection state of a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// No link; a reconnect is pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The link is up and delivering bytes.
    Connected,
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// A producer of raw telemetry bytes.
///
/// Implementations are blocking readers with a short timeout: `read`
/// returning `Ok(0)` means nothing arrived before the timeout, not end of
/// stream. A read error marks the source disconnected; the pipeline then
/// drives `reconnect` under its backoff policy.
pub trait FrameSource: Send + std::fmt::Debug {
    /// Human-readable identity of the link (port path or address).
    fn description(&self) -> String;

    /// Read available bytes into `buf`.
    ///
    /// Returns `Ok(0)` when the read timed out with nothing available.
    ///
    /// # Errors
    ///
    /// Returns an error when the link fails; the source transitions to
    /// [`SourceState::Disconnected`].
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Whether the link is currently up.
    fn connected(&self) -> bool;

    /// Attempt to (re-)establish the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection attempt fails.
    fn reconnect(&mut self) -> Result<()>;

    /// Current connection state.
    fn state(&self) -> SourceState;
}

/// Exponential reconnect backoff with a capped delay and a bounded attempt
/// budget.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff policy.
    ///
    /// `max_attempts` of 0 means unlimited retries.
    #[must_use]
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            attempt: 0,
        }
    }

    /// Build the policy from source configuration.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_initial_ms),
            Duration::from_millis(config.reconnect_max_ms),
            config.reconnect_max_attempts,
        )
    }

    /// The delay before the next attempt, or `None` when the budget is
    /// exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self
            .initial
            .checked_mul(1_u32.checked_shl(self.attempt).unwrap_or(u32::MAX))
            .map_or(self.max, |d| d.min(self.max));
        self.attempt += 1;
        Some(delay)
    }

    /// Reset the attempt counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Open the frame source variant selected by the configuration.
///
/// A failure here (device not found, permission denied, nothing listening on
/// the loopback port) is the fatal initial-connect case and is reported to
/// the operator as a connection fault.
///
/// # Errors
///
/// Returns [`crate::Error::Connection`] if the source cannot be opened.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config.mode {
        SourceMode::Serial => Ok(Box::new(SerialSource::open(
            &config.port,
            config.baudrate,
        )?)),
        SourceMode::Loopback => Ok(Box::new(LoopbackSource::connect(
            &config.host,
            config.listen_port,
        )?)),
    }
}
