//! Frame decoding for groundlink.
//!
//! The decoder turns the source's raw byte stream into typed
//! [`TelemetryRecord`]s. [`LineAssembler`] splits chunks into complete
//! newline-terminated lines, carrying any partial tail across reads.
//! [`FrameDecoder`] parses one line at a time, owns the authoritative
//! sequence counter, and quarantines malformed input without ever
//! interrupting the stream.

use crate::error::{Error, Result};
use crate::record::{is_header_line, RecoveryStatus, TelemetryRecord, FIELD_COUNT, FIELD_DELIMITER};

/// Splits a raw byte stream into complete lines.
///
/// Bytes after the last newline are buffered until the next chunk arrives, so
/// a frame split across two reads is reassembled rather than rejected.
#[derive(Debug, Default)]
pub struct LineAssembler {
    tail: Vec<u8>,
}

impl LineAssembler {
    /// Create a new assembler with an empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete line it finishes.
    ///
    /// Line terminators are stripped. The trailing partial line (if any) is
    /// held back until a later chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(std::mem::take(&mut self.tail));
            } else {
                self.tail.push(byte);
            }
        }
        lines
    }

    /// Number of buffered bytes waiting for a terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tail.len()
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.tail.clear();
    }
}

/// Stateful frame decoder.
///
/// Holds the next sequence number to assign plus running counters for
/// accepted and malformed frames. A malformed frame never consumes a
/// sequence number, so every consumer downstream of a correctly functioning
/// pipeline observes a gap-free sequence.
#[derive(Debug)]
pub struct FrameDecoder {
    next_sequence: u64,
    accepted: u64,
    malformed: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder whose first accepted frame gets sequence 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            accepted: 0,
            malformed: 0,
        }
    }

    /// Decode one raw line of bytes.
    ///
    /// Returns `Ok(Some(record))` for a valid frame, `Ok(None)` for an empty
    /// or header line (skipped silently, no sequence consumed), and
    /// `Err(Error::MalformedFrame)` for anything else. Never panics on
    /// arbitrary input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] carrying the raw line when the field
    /// count is wrong, a field fails type conversion, or the bytes are not
    /// valid UTF-8.
    pub fn decode_bytes(&mut self, raw: &[u8]) -> Result<Option<TelemetryRecord>> {
        match std::str::from_utf8(raw) {
            Ok(line) => self.decode_line(line),
            Err(_) => {
                self.malformed += 1;
                Err(Error::malformed_frame(String::from_utf8_lossy(raw)))
            }
        }
    }

    /// Decode one text line.
    ///
    /// Same contract as [`FrameDecoder::decode_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] when the line is not a valid frame.
    pub fn decode_line(&mut self, line: &str) -> Result<Option<TelemetryRecord>> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || is_header_line(line) {
            return Ok(None);
        }

        match Self::parse_fields(line) {
            Some(record) => {
                let record = TelemetryRecord {
                    sequence: self.next_sequence,
                    ..record
                };
                self.next_sequence += 1;
                self.accepted += 1;
                Ok(Some(record))
            }
            None => {
                self.malformed += 1;
                Err(Error::malformed_frame(line))
            }
        }
    }

    /// Parse the 11 wire fields. The on-wire counter (field 0) is validated
    /// as an integer but discarded; the caller assigns the sequence.
    fn parse_fields(line: &str) -> Option<TelemetryRecord> {
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return None;
        }

        // Untrusted flight-computer counter: syntax check only.
        let _wire_counter: u64 = fields[0].parse().ok()?;

        let mut values = [0.0_f64; 9];
        for (slot, field) in values.iter_mut().zip(&fields[1..10]) {
            *slot = field.parse().ok()?;
        }

        let status_code: u8 = fields[10].parse().ok()?;
        let recovery_status = RecoveryStatus::from_code(status_code)?;

        Some(TelemetryRecord {
            sequence: 0,
            accel_x: values[0],
            accel_y: values[1],
            accel_z: values[2],
            gps_lat: values[3],
            gps_lon: values[4],
            gps_alt: values[5],
            env_temp: values[6],
            env_pressure: values[7],
            env_humidity: values[8],
            recovery_status,
        })
    }

    /// The sequence number the next accepted frame will receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Number of frames accepted so far.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Number of frames rejected as malformed so far.
    #[must_use]
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
