//! Error types for groundlink.
//!
//! This module defines all error types used throughout the groundlink crate.
//! The fault taxonomy distinguishes between fatal conditions (the frame source
//! is unreachable after retries) and locally recovered faults (a malformed
//! frame, an unwritable log) that never stop ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for groundlink operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Frame Source Errors ===
    /// The frame source could not be reached or was lost for good.
    #[error("failed to connect to frame source '{port}': {message}")]
    Connection {
        /// The serial port path or network address.
        port: String,
        /// Description of what went wrong.
        message: String,
    },

    /// One input line failed to parse into a telemetry record.
    ///
    /// Carries the raw line for diagnostics. Ingestion continues; no record
    /// is produced and no sequence number is consumed.
    #[error("malformed frame: {line:?}")]
    MalformedFrame {
        /// The raw line that failed to parse.
        line: String,
    },

    // === Record Sink Errors ===
    /// The durable log became unwritable. The sink fails closed.
    #[error("durable log write failed: {message}")]
    LogWrite {
        /// Description of what went wrong.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for groundlink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new connection error.
    #[must_use]
    pub fn connection(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new malformed frame error carrying the raw line.
    #[must_use]
    pub fn malformed_frame(line: impl Into<String>) -> Self {
        Self::MalformedFrame { line: line.into() }
    }

    /// Create a new log write error.
    #[must_use]
    pub fn log_write(message: impl Into<String>) -> Self {
        Self::LogWrite {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a malformed frame fault.
    #[must_use]
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Self::MalformedFrame { .. })
    }

    /// Check if this error is a connection fault.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
