//! Broadcast server for groundlink.
//!
//! Fans each accepted record out to every connected viewer without ever
//! blocking ingestion. Each viewer owns a bounded outbound queue with a
//! drop-oldest overflow policy and a per-viewer drop counter; a slow viewer
//! loses old records but is never disconnected for slowness alone.
//!
//! Viewers speak a line-oriented JSON protocol over TCP: every accepted
//! record arrives as a `record` message carrying its `sequence`, so a viewer
//! can detect and report gaps caused by its own drops. Sending the request
//! line `snapshot` returns a point-in-time diagnostic view: the last N
//! accepted records plus every viewer's drop counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::record::TelemetryRecord;
use crate::store::TelemetryStore;

/// Identifier assigned to each viewer connection.
pub type ViewerId = u64;

/// The diagnostic request line a viewer sends.
const SNAPSHOT_REQUEST: &str = "snapshot";

/// Bounded per-viewer outbound queue with drop-oldest overflow.
#[derive(Debug)]
pub struct ViewerQueue {
    inner: Mutex<std::collections::VecDeque<TelemetryRecord>>,
    capacity: usize,
    drops: AtomicU64,
    notify: Notify,
}

impl ViewerQueue {
    /// Create a queue holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
            capacity,
            drops: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Push a record, dropping the oldest queued one if full.
    ///
    /// Never blocks beyond the bounded critical section; safe to call from
    /// the ingestion path.
    pub fn push(&self, record: TelemetryRecord) {
        {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if inner.len() == self.capacity {
                inner.pop_front();
                self.drops.fetch_add(1, Ordering::Relaxed);
            }
            inner.push_back(record);
        }
        self.notify.notify_one();
    }

    /// Pop the next queued record, waiting until one is available.
    pub async fn pop(&self) -> TelemetryRecord {
        loop {
            let notified = self.notify.notified();
            if let Some(record) = self.try_pop() {
                return record;
            }
            notified.await;
        }
    }

    /// Pop without waiting.
    #[must_use]
    pub fn try_pop(&self) -> Option<TelemetryRecord> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    /// Records dropped from this queue due to overflow.
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Number of records currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of live viewer queues.
///
/// The ingestion path publishes through this; the accept loop registers and
/// unregisters viewers. Both sides only ever hold the map lock for a bounded
/// critical section, so connect/disconnect never pauses ingestion.
#[derive(Debug)]
pub struct ViewerRegistry {
    viewers: Mutex<HashMap<ViewerId, Arc<ViewerQueue>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl ViewerRegistry {
    /// Create a registry whose viewers get queues of `queue_capacity`.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// Register a new viewer, returning its id and queue.
    #[must_use]
    pub fn register(&self) -> (ViewerId, Arc<ViewerQueue>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ViewerQueue::new(self.queue_capacity));
        self.viewers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, Arc::clone(&queue));
        (id, queue)
    }

    /// Remove a viewer from the registry.
    pub fn unregister(&self, id: ViewerId) {
        self.viewers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
    }

    /// Push a record to every live viewer queue.
    pub fn publish(&self, record: &TelemetryRecord) {
        let viewers = self
            .viewers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for queue in viewers.values() {
            queue.push(record.clone());
        }
    }

    /// Every viewer's drop counter, in ascending viewer id order.
    #[must_use]
    pub fn drop_counts(&self) -> Vec<ViewerDrops> {
        let viewers = self
            .viewers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut counts: Vec<ViewerDrops> = viewers
            .iter()
            .map(|(&viewer_id, queue)| ViewerDrops {
                viewer_id,
                drops: queue.drops(),
            })
            .collect();
        counts.sort_by_key(|v| v.viewer_id);
        counts
    }

    /// Number of connected viewers.
    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.viewers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// One viewer's drop counter, as reported in the diagnostic snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewerDrops {
    /// The viewer's connection id.
    pub viewer_id: ViewerId,
    /// Records dropped from this viewer's queue due to overflow.
    pub drops: u64,
}

/// Messages sent to viewers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ViewerMessage {
    /// One accepted telemetry record.
    Record { record: TelemetryRecord },
    /// Point-in-time diagnostic view.
    Snapshot {
        records: Vec<TelemetryRecord>,
        viewers: Vec<ViewerDrops>,
    },
    /// The relay is shutting down.
    Shutdown,
}

/// Viewer-facing TCP server.
#[derive(Debug)]
pub struct BroadcastServer {
    registry: Arc<ViewerRegistry>,
    store: Arc<TelemetryStore>,
    snapshot_len: usize,
}

impl BroadcastServer {
    /// Create a server publishing through `registry` and answering snapshot
    /// requests from `store`.
    #[must_use]
    pub fn new(
        registry: Arc<ViewerRegistry>,
        store: Arc<TelemetryStore>,
        snapshot_len: usize,
    ) -> Self {
        Self {
            registry,
            store,
            snapshot_len,
        }
    }

    /// Accept viewers until shutdown is signalled.
    ///
    /// Each accepted connection runs in its own task; accepting never touches
    /// the ingestion path. On shutdown the server joins every viewer task
    /// before returning, so each viewer's closing notification is on the wire
    /// by the time `run` completes.
    pub async fn run(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        info!(
            "broadcast server listening on {}",
            listener
                .local_addr()
                .map_or_else(|_| "<unknown>".to_string(), |a| a.to_string())
        );

        let mut viewers = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("viewer connected from {peer}");
                            let registry = Arc::clone(&self.registry);
                            let store = Arc::clone(&self.store);
                            let snapshot_len = self.snapshot_len;
                            let shutdown = shutdown.clone();
                            viewers.spawn(async move {
                                handle_viewer(stream, &registry, &store, snapshot_len, shutdown)
                                    .await;
                            });
                        }
                        Err(e) => warn!("viewer accept failed: {e}"),
                    }
                }
                // Reap viewer tasks as their connections close
                Some(_) = viewers.join_next() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("broadcast server shutting down");
                        break;
                    }
                }
            }
        }

        // Every connected viewer must see its shutdown notification before
        // the server returns and the runtime can go away.
        while viewers.join_next().await.is_some() {}
        info!("broadcast server stopped");
    }
}

/// Serve one viewer connection until it disconnects or shutdown.
async fn handle_viewer(
    stream: TcpStream,
    registry: &ViewerRegistry,
    store: &TelemetryStore,
    snapshot_len: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let (id, queue) = registry.register();
    let (read_half, mut write_half) = stream.into_split();
    let mut request_lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            record = queue.pop() => {
                let message = ViewerMessage::Record { record };
                if write_message(&mut write_half, &message).await.is_err() {
                    debug!("viewer {id} went away");
                    break;
                }
            }
            request = request_lines.next_line() => {
                match request {
                    Ok(Some(line)) if line.trim() == SNAPSHOT_REQUEST => {
                        let message = ViewerMessage::Snapshot {
                            records: store.recent(snapshot_len),
                            viewers: registry.drop_counts(),
                        };
                        if write_message(&mut write_half, &message).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(line)) => {
                        debug!("viewer {id} sent unknown request {line:?}");
                    }
                    // EOF or read error: the viewer disconnected
                    Ok(None) | Err(_) => {
                        debug!("viewer {id} disconnected");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = write_message(&mut write_half, &ViewerMessage::Shutdown).await;
                    break;
                }
            }
        }
    }

    registry.unregister(id);
}

/// Write one JSON message line.
async fn write_message<W>(writer: &mut W, message: &ViewerMessage) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let mut line = serde_json::to_string(message).map_err(std::io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}
