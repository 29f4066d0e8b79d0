//! Per-subscription streaming reader over chunks.
//!
//! A reader moves through `Fresh → Streaming → Closed`. Opening the stream
//! spawns a worker that services chunk requests: each chunk first consults
//! the manager's filter cache, then walks the live ring backwards from the
//! saved cursor, and on lapping falls back to a historical query whose
//! page is deposited into the cache. The output channel is closed exactly
//! once, strictly after the last emitted record.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use logfold_core::defaults::{CACHE_RING_CAPACITY, CHUNK_SIZE};
use logfold_core::{Error, LogFilter, LogRecord, Result};

use crate::manager::LogManager;
use crate::ring::{Element, RingBuffer};

/// Sequence number of a chunk request on a reader stream.
pub type Chunk = u64;

/// Streaming handle for one subscription.
///
/// Holds only a weak view of the manager; a reader outliving its manager
/// simply observes a closed stream.
pub struct Reader {
    manager: Weak<LogManager>,
    filter: LogFilter,
    count: Arc<AtomicU64>,
    opened: AtomicBool,
    req_tx: mpsc::Sender<Chunk>,
    req_rx: Mutex<Option<mpsc::Receiver<Chunk>>>,
}

impl Reader {
    pub(crate) fn new(manager: Weak<LogManager>, filter: LogFilter) -> Self {
        let (req_tx, req_rx) = mpsc::channel(1);
        Self {
            manager,
            filter,
            count: Arc::new(AtomicU64::new(0)),
            opened: AtomicBool::new(false),
            req_tx,
            req_rx: Mutex::new(Some(req_rx)),
        }
    }

    /// Total records emitted on this reader's stream so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn filter(&self) -> &LogFilter {
        &self.filter
    }

    /// Begin streaming. May be called at most once; the second call fails
    /// with a lifecycle error.
    ///
    /// The returned channel yields the records of each requested chunk and
    /// closes when `cancel` fires, when history is exhausted, or when the
    /// receiver is dropped.
    pub fn open_stream(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Arc<LogRecord>>> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(Error::Lifecycle("stream already started".to_string()));
        }
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| Error::Lifecycle("log manager dropped".to_string()))?;
        let mut req_rx = self
            .req_rx
            .lock()
            .expect("reader lock poisoned")
            .take()
            .expect("request channel consumed before first open");

        let (out_tx, out_rx) = mpsc::channel(CHUNK_SIZE);
        let mut worker = StreamWorker {
            manager: self.manager.clone(),
            filter: self.filter.clone(),
            count: Arc::clone(&self.count),
            source: Source::Live(manager.buffer().element()),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    request = req_rx.recv() => match request {
                        Some(chunk) => {
                            if !worker.read_chunk(chunk, &out_tx).await {
                                return;
                            }
                        }
                        None => return,
                    },
                }
            }
        });

        Ok(out_rx)
    }

    /// Ask the stream to emit the next chunk. Fails once the stream has
    /// closed.
    pub async fn request_chunk(&self, chunk: Chunk) -> Result<()> {
        self.req_tx
            .send(chunk)
            .await
            .map_err(|_| Error::Lifecycle("reader stream closed".to_string()))
    }
}

/// Where the worker's cursor currently points.
enum Source {
    /// Walking the manager's live ring; `None` means exhausted or lapped.
    Live(Option<Element<LogRecord>>),
    /// Replaying a cached (or freshly fetched) historical page.
    Cached(Option<Element<LogRecord>>),
}

struct StreamWorker {
    manager: Weak<LogManager>,
    filter: LogFilter,
    count: Arc<AtomicU64>,
    source: Source,
}

impl StreamWorker {
    /// Serve one chunk. Returns whether the stream stays open.
    async fn read_chunk(&mut self, chunk: Chunk, out: &mpsc::Sender<Arc<LogRecord>>) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };

        debug!(
            subsystem = "store",
            component = "reader",
            op = "read_chunk",
            chunk,
            filter = %self.filter.sql(),
            "serving chunk"
        );

        // A cached page for this filter takes precedence over the live walk.
        if matches!(self.source, Source::Live(_)) {
            if let Some(ring) = manager.cached_ring(&self.filter) {
                self.source = Source::Cached(ring.element());
            }
        }

        let mut emitted = 0;
        while emitted < CHUNK_SIZE {
            match self.take_cursor() {
                Some(element) if element.is_valid() => {
                    self.put_cursor(element.next(0));
                    match self.filter.matches(element.value()) {
                        Ok(true) => {
                            if out.send(Arc::clone(element.value())).await.is_err() {
                                return false;
                            }
                            self.count.fetch_add(1, Ordering::SeqCst);
                            emitted += 1;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!(
                                subsystem = "store",
                                component = "reader",
                                error = %e,
                                "filter evaluation failed, closing stream"
                            );
                            return false;
                        }
                    }
                }
                _ => match self.source {
                    // Lapped (or the window never held a match): fall back
                    // to the persistent store.
                    Source::Live(_) => {
                        if !self.fetch_history(&manager).await {
                            return false;
                        }
                        if let Source::Cached(None) = self.source {
                            return false;
                        }
                    }
                    // The historical page is exhausted too.
                    Source::Cached(_) => return false,
                },
            }
        }

        true
    }

    fn take_cursor(&mut self) -> Option<Element<LogRecord>> {
        match &mut self.source {
            Source::Live(cursor) | Source::Cached(cursor) => cursor.take(),
        }
    }

    fn put_cursor(&mut self, element: Option<Element<LogRecord>>) {
        match &mut self.source {
            Source::Live(cursor) | Source::Cached(cursor) => *cursor = element,
        }
    }

    /// Issue the historical query and deposit the page as a cache entry.
    /// Returns whether the stream stays open.
    async fn fetch_history(&mut self, manager: &Arc<LogManager>) -> bool {
        let mut stream = match manager.store().get_logs(&self.filter).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    subsystem = "store",
                    component = "reader",
                    op = "get_logs",
                    error = %e,
                    "historical query failed, closing stream"
                );
                return false;
            }
        };

        let mut page = Vec::new();
        while let Some(next) = stream.next().await {
            match next {
                Ok(record) => page.push(record),
                Err(e) => {
                    warn!(
                        subsystem = "store",
                        component = "reader",
                        op = "get_logs",
                        error = %e,
                        "historical stream failed, closing stream"
                    );
                    return false;
                }
            }
        }

        if page.is_empty() {
            // Nothing cacheable; the stream ends here.
            self.source = Source::Cached(None);
            return true;
        }

        // The store yields newest first; ring write order is oldest first
        // so the newest record lands at the head cursor.
        let ring = RingBuffer::new(CACHE_RING_CAPACITY.max(page.len()));
        for record in page.into_iter().rev() {
            ring.write(record);
        }
        self.source = Source::Cached(ring.element());
        manager.insert_cache(self.filter.clone(), ring);
        true
    }
}
