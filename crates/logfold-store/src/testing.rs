//! Shared test doubles for the store crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use logfold_core::{LogFilter, LogRecord, LogStore, RecordStream, Result};

use crate::manager::LogManager;

/// In-memory [`LogStore`] that records writes and serves a seeded history.
#[derive(Default)]
pub struct StubStore {
    pub written: Mutex<Vec<LogRecord>>,
    history: Mutex<Vec<LogRecord>>,
    get_calls: AtomicUsize,
}

impl StubStore {
    /// Seed the historical result set, newest first.
    pub fn seed_history(&self, records: Vec<LogRecord>) {
        *self.history.lock().unwrap() = records;
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogStore for StubStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<RecordStream> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let matching: Vec<_> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|record| filter.matches(record).unwrap_or(false))
            .cloned()
            .map(Ok)
            .collect();
        Ok(futures::stream::iter(matching).boxed())
    }

    async fn write_log(&self, record: &LogRecord) -> Result<()> {
        self.written.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Wait until the manager's drain task has applied `expected` writes.
pub async fn drain_into_buffer(manager: &Arc<LogManager>, expected: u64) {
    for _ in 0..200 {
        if manager.written() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!(
        "drain task applied {} of {} writes",
        manager.written(),
        expected
    );
}
