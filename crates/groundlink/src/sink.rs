//! Record sink for groundlink.
//!
//! The sink is an async task draining the accepted-record stream into the
//! durable log. Writes are buffered and flushed either after a fixed record
//! count or a fixed interval, whichever comes first, bounding the data-loss
//! window on abrupt termination to that interval.
//!
//! Failure isolation: if the underlying storage becomes unwritable the sink
//! fails closed. It stops accepting further writes and surfaces a log write
//! fault, while the in-memory cache and the live fan-out continue unaffected.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::SinkConfig;
use crate::error::Error;
use crate::record::TelemetryRecord;
use crate::storage::Storage;

/// Shared, observable state of the sink.
#[derive(Debug, Default)]
pub struct SinkStatus {
    failed: AtomicBool,
    flushed: AtomicU64,
}

impl SinkStatus {
    /// Whether the sink has failed closed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total records flushed to the durable log.
    #[must_use]
    pub fn flushed(&self) -> u64 {
        self.flushed.load(Ordering::Relaxed)
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    fn add_flushed(&self, n: u64) {
        self.flushed.fetch_add(n, Ordering::Relaxed);
    }
}

/// Cloneable handle for feeding the sink from the ingestion path.
///
/// Sends never block. Once the sink has failed closed, sends become no-ops.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<TelemetryRecord>,
    status: Arc<SinkStatus>,
}

impl SinkHandle {
    /// Offer a record to the sink.
    pub fn send(&self, record: TelemetryRecord) {
        if self.status.is_failed() {
            return;
        }
        // A closed channel means the sink task is gone; nothing to do
        let _ = self.tx.send(record);
    }

    /// Observable sink state.
    #[must_use]
    pub fn status(&self) -> Arc<SinkStatus> {
        Arc::clone(&self.status)
    }
}

/// Spawn the sink task.
///
/// Returns the feed handle and the task's join handle. The task runs until
/// every [`SinkHandle`] clone is dropped, then performs a final drain flush
/// and exits.
#[must_use]
pub fn spawn(storage: Storage, config: &SinkConfig) -> (SinkHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let status = Arc::new(SinkStatus::default());

    let sink = RecordSink {
        storage,
        rx,
        flush_every: config.flush_every,
        flush_interval: std::time::Duration::from_millis(config.flush_interval_ms),
        status: Arc::clone(&status),
        buffer: Vec::with_capacity(config.flush_every),
    };

    let handle = SinkHandle { tx, status };
    let task = tokio::spawn(sink.run());
    (handle, task)
}

struct RecordSink {
    storage: Storage,
    rx: mpsc::UnboundedReceiver<TelemetryRecord>,
    flush_every: usize,
    flush_interval: std::time::Duration,
    status: Arc<SinkStatus>,
    buffer: Vec<TelemetryRecord>,
}

impl std::fmt::Debug for RecordSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSink")
            .field("flush_every", &self.flush_every)
            .field("flush_interval", &self.flush_interval)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl RecordSink {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.rx.recv() => {
                    match received {
                        Some(record) => {
                            if self.status.is_failed() {
                                continue;
                            }
                            self.buffer.push(record);
                            if self.buffer.len() >= self.flush_every {
                                self.flush();
                            }
                        }
                        // All senders dropped: drain and stop
                        None => {
                            self.flush();
                            info!(
                                "record sink stopped after flushing {} records",
                                self.status.flushed()
                            );
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush();
                }
            }
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() || self.status.is_failed() {
            self.buffer.clear();
            return;
        }

        match self.storage.insert_batch(&self.buffer) {
            Ok(written) => {
                debug!("flushed {} records to the durable log", written);
                self.status.add_flushed(u64::try_from(written).unwrap_or(0));
                self.buffer.clear();
            }
            Err(e) => {
                let fault = Error::log_write(e.to_string());
                error!("{fault}; sink failing closed, discarding {} buffered records", self.buffer.len());
                self.status.mark_failed();
                self.buffer.clear();
            }
        }
    }
}
