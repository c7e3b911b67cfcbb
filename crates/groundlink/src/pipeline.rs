//! Ingestion pipeline for groundlink.
//!
//! The pipeline is the single writer of the whole system: it owns the frame
//! source, drives reconnects under the backoff policy, decodes each complete
//! line, and dispatches every accepted record to the in-memory store, the
//! record sink, and the broadcast registry in one pass.
//!
//! It runs as a blocking loop (the serial and loopback sources are blocking
//! readers with a short timeout) and is expected to live on a dedicated
//! blocking thread, polling a watch channel for shutdown between reads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broadcast::ViewerRegistry;
use crate::decoder::{FrameDecoder, LineAssembler};
use crate::error::{Error, Result};
use crate::sink::SinkHandle;
use crate::source::{Backoff, FrameSource};
use crate::store::TelemetryStore;

/// Read buffer size for one source read.
const READ_BUF_LEN: usize = 4096;

/// Granularity of shutdown polling while sleeping between reconnects.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Everything the ingestion loop dispatches into.
///
/// The broadcast registry and the sink are optional so the direct capture
/// mode can run the same loop without a server or with echo only.
pub struct PipelineOutputs {
    /// In-memory bounded cache of recent records.
    pub store: Arc<TelemetryStore>,
    /// Feed handle for the durable-log sink, if one is running.
    pub sink: Option<SinkHandle>,
    /// Viewer fan-out registry, if a broadcast server is running.
    pub registry: Option<Arc<ViewerRegistry>>,
    /// Echo each accepted record to stdout as a CSV line.
    pub echo: bool,
}

impl std::fmt::Debug for PipelineOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOutputs")
            .field("has_sink", &self.sink.is_some())
            .field("has_registry", &self.registry.is_some())
            .field("echo", &self.echo)
            .finish()
    }
}

/// Final counters reported when the pipeline stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// Frames accepted and dispatched.
    pub accepted: u64,
    /// Frames rejected as malformed.
    pub malformed: u64,
}

/// Run the ingestion loop until shutdown or a fatal connection fault.
///
/// Dispatch order per accepted record is store, then sink, then fan-out, so
/// a snapshot taken right after a record is broadcast always contains it.
/// Malformed frames are logged with the offending line and skipped; they
/// never stop the stream.
///
/// # Errors
///
/// Returns [`Error::Connection`] when the reconnect budget is exhausted.
/// All other faults are handled in place.
pub fn run(
    mut source: Box<dyn FrameSource>,
    mut backoff: Backoff,
    outputs: &PipelineOutputs,
    shutdown: &watch::Receiver<bool>,
) -> Result<PipelineReport> {
    let mut assembler = LineAssembler::new();
    let mut decoder = FrameDecoder::new();
    let mut buf = [0_u8; READ_BUF_LEN];

    info!("ingestion started from {}", source.description());

    while !*shutdown.borrow() {
        if !source.connected() {
            reconnect(source.as_mut(), &mut backoff, shutdown)?;
            if *shutdown.borrow() {
                break;
            }
            // A reconnect may resume mid-frame; drop the stale partial tail
            assembler.clear();
        }

        match source.read(&mut buf) {
            // Timeout with nothing available; loop around to poll shutdown
            Ok(0) => {}
            Ok(n) => {
                for line in assembler.push(&buf[..n]) {
                    dispatch_line(&mut decoder, &line, outputs);
                }
            }
            Err(e) => {
                warn!("{e}; link to {} lost", source.description());
            }
        }
    }

    let report = PipelineReport {
        accepted: decoder.accepted(),
        malformed: decoder.malformed(),
    };
    info!(
        "ingestion stopped: {} accepted, {} malformed",
        report.accepted, report.malformed
    );
    Ok(report)
}

/// Decode one line and fan the record out to every output.
fn dispatch_line(decoder: &mut FrameDecoder, line: &[u8], outputs: &PipelineOutputs) {
    match decoder.decode_bytes(line) {
        Ok(Some(record)) => {
            if outputs.echo {
                println!("{}", record.encode_line());
            }
            outputs.store.accept(record.clone());
            if let Some(sink) = &outputs.sink {
                sink.send(record.clone());
            }
            if let Some(registry) = &outputs.registry {
                registry.publish(&record);
            }
        }
        Ok(None) => {}
        Err(fault) => {
            // Quarantine and continue; the stream must never stop here
            warn!("{fault}");
        }
    }
}

/// Drive reconnect attempts under the backoff policy.
///
/// Returns `Ok(())` once the link is up or shutdown was requested mid-wait.
///
/// # Errors
///
/// Returns [`Error::Connection`] when the attempt budget runs out.
fn reconnect(
    source: &mut dyn FrameSource,
    backoff: &mut Backoff,
    shutdown: &watch::Receiver<bool>,
) -> Result<()> {
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                "giving up on {} after {} attempts",
                source.description(),
                backoff.attempts()
            );
            return Err(Error::connection(
                source.description(),
                format!("reconnect budget exhausted after {} attempts", backoff.attempts()),
            ));
        };

        debug!(
            "reconnect attempt {} to {} in {:?}",
            backoff.attempts(),
            source.description(),
            delay
        );
        sleep_with_shutdown(delay, shutdown);
        if *shutdown.borrow() {
            return Ok(());
        }

        match source.reconnect() {
            Ok(()) => {
                info!("connected to {}", source.description());
                backoff.reset();
                return Ok(());
            }
            Err(e) => warn!("{e}"),
        }
    }
}

/// Sleep for `delay` while polling the shutdown signal.
fn sleep_with_shutdown(delay: Duration, shutdown: &watch::Receiver<bool>) {
    let deadline = Instant::now() + delay;
    while Instant::now() < deadline {
        if *shutdown.borrow() {
            return;
        }
        std::thread::sleep(SHUTDOWN_POLL.min(deadline.saturating_duration_since(Instant::now())));
    }
}
