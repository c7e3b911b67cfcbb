//! Serial-link frame source.
//!
//! Reads the flight computer's byte stream from a physical serial port
//! (8N1, no flow control, short read timeout).

use std::io::Read;

use serialport::SerialPort;
use tracing::{debug, info};

use super::{FrameSource, SourceState, READ_TIMEOUT};
use crate::error::{Error, Result};

/// Frame source backed by a physical serial port.
pub struct SerialSource {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    state: SourceState,
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SerialSource {
    /// Open a serial port.
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the device is missing, permission is
    /// denied, or the port cannot be configured. This is the fatal
    /// initial-connect case.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let mut source = Self {
            path: path.to_string(),
            baud_rate,
            port: None,
            state: SourceState::Disconnected,
        };
        source.reconnect()?;
        Ok(source)
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>> {
        serialport::new(&self.path, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| Error::connection(&self.path, e.to_string()))
    }
}

impl FrameSource for SerialSource {
    fn description(&self) -> String {
        format!("serial:{} @ {} baud", self.path, self.baud_rate)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(Error::connection(&self.path, "port not open"));
        };

        match port.read(buf) {
            Ok(n) => Ok(n),
            // Timeout with nothing available is the idle case, not a fault
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                debug!("serial read error on {}: {}", self.path, e);
                self.state = SourceState::Disconnected;
                self.port = None;
                Err(e.into())
            }
        }
    }

    fn connected(&self) -> bool {
        self.state == SourceState::Connected
    }

    fn reconnect(&mut self) -> Result<()> {
        self.state = SourceState::Connecting;
        match self.open_port() {
            Ok(port) => {
                info!("opened serial port {} at {} baud", self.path, self.baud_rate);
                self.port = Some(port);
                self.state = SourceState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = SourceState::Disconnected;
                Err(e)
            }
        }
    }

    fn state(&self) -> SourceState {
        self.state
    }
}
