//! `groundlink` - A ground-station telemetry relay
//!
//! This library provides the core functionality for ingesting telemetry
//! frames from a flight computer, decoding them into typed records, caching
//! the recent stream in memory, appending every record to a durable log, and
//! fanning the live stream out to connected viewers.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod source;
pub mod storage;
pub mod store;

pub use config::Config;
pub use decoder::{FrameDecoder, LineAssembler};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::{RecoveryStatus, TelemetryRecord};
pub use source::{FrameSource, SourceState};
pub use storage::{Storage, StorageStats};
pub use store::TelemetryStore;
