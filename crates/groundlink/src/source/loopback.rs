//! Loopback frame source.
//!
//! A TCP test channel satisfying the same contract as the serial link: a
//! harness (or a simulated flight computer) listens on `host:port` and writes
//! frame lines; this source connects and reads them. Used for integration
//! testing and bench setups with no radio hardware attached.

use std::io::Read;
use std::net::TcpStream;

use tracing::{debug, info};

use super::{FrameSource, SourceState, READ_TIMEOUT};
use crate::error::{Error, Result};

/// Frame source backed by a loopback TCP connection.
#[derive(Debug)]
pub struct LoopbackSource {
    addr: String,
    stream: Option<TcpStream>,
    state: SourceState,
}

impl LoopbackSource {
    /// Connect to the test channel at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if nothing is listening. This is the
    /// fatal initial-connect case.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let mut source = Self {
            addr: format!("{host}:{port}"),
            stream: None,
            state: SourceState::Disconnected,
        };
        source.reconnect()?;
        Ok(source)
    }

    fn open_stream(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .map_err(|e| Error::connection(&self.addr, e.to_string()))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| Error::connection(&self.addr, e.to_string()))?;
        Ok(stream)
    }
}

impl FrameSource for LoopbackSource {
    fn description(&self) -> String {
        format!("loopback:{}", self.addr)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::connection(&self.addr, "channel not open"));
        };

        match stream.read(buf) {
            // A TCP read of 0 bytes means the peer closed the channel
            Ok(0) => {
                debug!("loopback peer {} closed the channel", self.addr);
                self.state = SourceState::Disconnected;
                self.stream = None;
                Err(Error::connection(&self.addr, "peer closed the channel"))
            }
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => {
                debug!("loopback read error on {}: {}", self.addr, e);
                self.state = SourceState::Disconnected;
                self.stream = None;
                Err(e.into())
            }
        }
    }

    fn connected(&self) -> bool {
        self.state == SourceState::Connected
    }

    fn reconnect(&mut self) -> Result<()> {
        self.state = SourceState::Connecting;
        match self.open_stream() {
            Ok(stream) => {
                info!("connected loopback channel to {}", self.addr);
                self.stream = Some(stream);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn spawn_feeder(payload: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            if let Ok((mut socket, _)) = listener.accept() {
                let _ = socket.write_all(payload);
            }
        });
        port
    }

    #[test]
    fn test_connect_nothing_listening() {
        let result = LoopbackSource::connect("127.0.0.1", 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_connection());
    }

    #[test]
    fn test_connect_and_read() {
        let port = spawn_feeder(b"1,2,3\n");
        let mut source = LoopbackSource::connect("127.0.0.1", port).unwrap();
        assert!(source.connected());
        assert_eq!(source.state(), SourceState::Connected);

        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        while collected.len() < 6 {
            match source.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(_) => break,
            }
        }
        assert_eq!(&collected, b"1,2,3\n");
    }

    #[test]
    fn test_peer_close_disconnects() {
        let port = spawn_feeder(b"");
        let mut source = LoopbackSource::connect("127.0.0.1", port).unwrap();

        let mut buf = [0u8; 16];
        // Drain until the peer-close surfaces as a connection fault
        let mut saw_disconnect = false;
        for _ in 0..50 {
            match source.read(&mut buf) {
                Ok(_) => {}
                Err(err) => {
                    assert!(err.is_connection());
                    saw_disconnect = true;
                    break;
                }
            }
        }
        assert!(saw_disconnect);
        assert!(!source.connected());
    }

    #[test]
    fn test_description() {
        let port = spawn_feeder(b"x\n");
        let source = LoopbackSource::connect("127.0.0.1", port).unwrap();
        assert!(source.description().starts_with("loopback:127.0.0.1:"));
    }
}
