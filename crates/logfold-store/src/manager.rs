//! Log manager: write serialization, buffer ownership, filter-cache lookup.
//!
//! All ingest funnels through a single bounded channel drained by one task
//! for the lifetime of the manager. The drain applies each record to the
//! primary ring buffer (which fans out to live listeners) and then persists
//! it through the [`LogStore`] collaborator. Persistence failures are logged
//! and never block ingest — the in-memory window stays authoritative for
//! the session.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use logfold_core::defaults::{FILTER_CACHE_CAPACITY, RING_CAPACITY};
use logfold_core::{Error, Fingerprint, LogFilter, LogRecord, LogStore, Result};

use crate::hashset::FixedHashSet;
use crate::reader::Reader;
use crate::ring::{Element, RingBuffer};

/// A cached historical query result: the filter it answers plus a small
/// ring holding the page fetched for it, keyed by the filter fingerprint.
pub struct FilterCache {
    filter: LogFilter,
    ring: Arc<RingBuffer<LogRecord>>,
}

impl Fingerprint for FilterCache {
    fn fingerprint(&self) -> u64 {
        self.filter.fingerprint()
    }
}

/// Central owner of the in-memory retention window.
///
/// The manager exclusively owns its ring buffer, its filter cache, and the
/// write-serialization channel. Readers share weak views of the buffer and
/// never own records.
pub struct LogManager {
    buffer: Arc<RingBuffer<LogRecord>>,
    caches: FixedHashSet<FilterCache>,
    store: Arc<dyn LogStore>,
    write_tx: mpsc::Sender<LogRecord>,
    /// Serializes stamping + enqueue so `received_at` is monotone in queue
    /// order.
    write_lock: Mutex<()>,
    /// Handle to the owning `Arc`, used to bind readers without keeping the
    /// manager alive through them.
    self_ref: std::sync::Weak<Self>,
}

impl LogManager {
    /// Create a manager over a buffer of `capacity` records and spawn its
    /// drain task. Must be called within a tokio runtime.
    pub fn new(capacity: usize, store: Arc<dyn LogStore>) -> Arc<Self> {
        let buffer = RingBuffer::new(capacity);
        let (write_tx, mut write_rx) = mpsc::channel::<LogRecord>(capacity);

        let drain_buffer = Arc::clone(&buffer);
        let drain_store = Arc::clone(&store);
        tokio::spawn(async move {
            while let Some(record) = write_rx.recv().await {
                let record = Arc::new(record);
                drain_buffer.write_arc(Arc::clone(&record));
                if let Err(e) = drain_store.write_log(&record).await {
                    warn!(
                        subsystem = "store",
                        component = "manager",
                        op = "persist",
                        error = %e,
                        "failed to persist record; in-memory window remains authoritative"
                    );
                }
            }
        });

        Arc::new_cyclic(|self_ref| Self {
            buffer,
            caches: FixedHashSet::new(FILTER_CACHE_CAPACITY),
            store,
            write_tx,
            write_lock: Mutex::new(()),
            self_ref: self_ref.clone(),
        })
    }

    /// Manager with the default retention window.
    pub fn with_defaults(store: Arc<dyn LogStore>) -> Arc<Self> {
        Self::new(RING_CAPACITY, store)
    }

    /// Ingest one record.
    ///
    /// Rejects an empty record. Stamps `received_at` exactly once, derives
    /// the JSON view of the message, and enqueues onto the serializing
    /// write channel — suspending when it is full, which is the
    /// backpressure felt by producers. Buffer application and persistence
    /// happen on the drain task.
    pub async fn write(&self, mut record: LogRecord) -> Result<()> {
        if record.is_empty() {
            return Err(Error::InvalidInput(
                "log record has an empty message".to_string(),
            ));
        }

        let guard = self.write_lock.lock().await;
        record.received_at = Some(Utc::now());
        record.derive_message_json();
        self.write_tx
            .send(record)
            .await
            .map_err(|_| Error::Lifecycle("write channel closed".to_string()))?;
        drop(guard);

        Ok(())
    }

    /// Construct a per-subscription reader bound to this manager. Streaming
    /// does not begin until [`Reader::open_stream`] is called.
    pub fn get_reader(&self, filter: LogFilter) -> Reader {
        Reader::new(self.self_ref.clone(), filter)
    }

    /// Attach a live listener to the buffer, atomically snapshotting the
    /// newest cursor. The listener is detached and its channel closed when
    /// `cancel` fires or it falls behind.
    pub fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> (Option<Element<LogRecord>>, mpsc::Receiver<Arc<LogRecord>>) {
        self.buffer.element_and_listener(cancel)
    }

    /// Total records ever written into the buffer.
    pub fn written(&self) -> u64 {
        self.buffer.counter()
    }

    /// Capacity of the in-memory window.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub(crate) fn buffer(&self) -> &Arc<RingBuffer<LogRecord>> {
        &self.buffer
    }

    pub(crate) fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Cached page for a filter, if one exists. Keyed by fingerprint,
    /// confirmed by structural equality so a fingerprint collision cannot
    /// serve a wrong page.
    pub(crate) fn cached_ring(&self, filter: &LogFilter) -> Option<Arc<RingBuffer<LogRecord>>> {
        let element = self.caches.get(filter.fingerprint())?;
        let entry = element.item();
        if entry.filter == *filter {
            Some(Arc::clone(&entry.ring))
        } else {
            None
        }
    }

    /// Deposit a fetched page for a filter, evicting the oldest cache entry
    /// when the cache is full.
    pub(crate) fn insert_cache(&self, filter: LogFilter, ring: Arc<RingBuffer<LogRecord>>) {
        self.caches.add(FilterCache { filter, ring });
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManager")
            .field("capacity", &self.buffer.capacity())
            .field("written", &self.buffer.counter())
            .field("cached_filters", &self.caches.size())
            .finish()
    }
}
