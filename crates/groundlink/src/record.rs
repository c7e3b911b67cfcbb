//! Core telemetry record types for groundlink.
//!
//! This module defines the fundamental data structures for representing one
//! decoded telemetry sample, plus the line-oriented wire encoding shared by
//! the flight computer, the durable log, and direct-mode output.

use serde::{Deserialize, Serialize};

/// Number of comma-separated fields in one wire frame.
pub const FIELD_COUNT: usize = 11;

/// Field delimiter in the wire format.
pub const FIELD_DELIMITER: char = ',';

/// Discrete recovery-mechanism state reported by the flight computer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    /// Recovery mechanism has not been armed or fired.
    NotDeployed,
    /// Recovery mechanism is armed and waiting for the deploy condition.
    Armed,
    /// Recovery mechanism has fired.
    Deployed,
}

impl RecoveryStatus {
    /// The numeric code used on the wire and in the durable log.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::NotDeployed => 0,
            Self::Armed => 1,
            Self::Deployed => 2,
        }
    }

    /// Convert a wire code back to a status.
    ///
    /// Returns `None` for unknown codes.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotDeployed),
            1 => Some(Self::Armed),
            2 => Some(Self::Deployed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDeployed => write!(f, "not_deployed"),
            Self::Armed => write!(f, "armed"),
            Self::Deployed => write!(f, "deployed"),
        }
    }
}

/// One decoded telemetry sample.
///
/// Immutable once constructed: a record exists only if all fields of the wire
/// frame were present and individually convertible, so no record is ever
/// partially populated. `sequence` is assigned by the decoder and is the
/// authoritative ordering key; the flight computer's own counter is untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Decoder-assigned, strictly increasing ordering key.
    pub sequence: u64,

    /// Acceleration along the X axis.
    pub accel_x: f64,
    /// Acceleration along the Y axis.
    pub accel_y: f64,
    /// Acceleration along the Z axis.
    pub accel_z: f64,

    /// GPS latitude in degrees.
    pub gps_lat: f64,
    /// GPS longitude in degrees.
    pub gps_lon: f64,
    /// GPS altitude in meters.
    pub gps_alt: f64,

    /// Ambient temperature.
    pub env_temp: f64,
    /// Ambient pressure.
    pub env_pressure: f64,
    /// Relative humidity.
    pub env_humidity: f64,

    /// Recovery mechanism state.
    pub recovery_status: RecoveryStatus,
}

impl TelemetryRecord {
    /// Encode this record as one wire line (no terminator).
    ///
    /// The field order matches the frame schema: sequence, accelerometer
    /// axes, GPS position, environmental readings, recovery status code.
    #[must_use]
    pub fn encode_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.sequence,
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.gps_lat,
            self.gps_lon,
            self.gps_alt,
            self.env_temp,
            self.env_pressure,
            self.env_humidity,
            self.recovery_status.code(),
        )
    }
}

/// Column names a header line may start with.
///
/// Some firmware revisions emit the counter column first, others start the
/// header at the accelerometer columns.
const HEADER_FIELD_NAMES: &[&str] = &["counter", "seq", "accel_x"];

/// Check whether a line is a CSV header rather than a data frame.
///
/// The flight computer may prefix its stream with a header line naming the
/// fields (`accel_x,accel_y,...`). Only a first field matching a known
/// column name counts as a header; any other non-numeric first field is left
/// for the decoder to reject, so a corrupt data line still registers as a
/// malformed frame.
#[must_use]
pub fn is_header_line(line: &str) -> bool {
    line.split(FIELD_DELIMITER)
        .next()
        .map(str::trim)
        .is_some_and(|field| HEADER_FIELD_NAMES.contains(&field))
}
