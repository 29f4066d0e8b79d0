//! Core traits for logfold abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable persistence backends and testability.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::filter::LogFilter;
use crate::models::LogRecord;

/// An item that exposes a stable 64-bit fingerprint, used as the key of
/// bounded caches. Equal items must fingerprint equally.
pub trait Fingerprint {
    fn fingerprint(&self) -> u64;
}

/// Stream of historical records produced by a [`LogStore`] query.
pub type RecordStream = BoxStream<'static, Result<LogRecord>>;

/// Persistence adapter for log records.
///
/// The in-memory window is authoritative for the live session; the store is
/// consulted only for historical queries (cache misses) and receives every
/// ingested record asynchronously. Write failures must not block ingest.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Prepare the backend (create schema, verify connectivity).
    async fn init(&self) -> Result<()>;

    /// Fetch historical records matching the filter, newest first.
    async fn get_logs(&self, filter: &LogFilter) -> Result<RecordStream>;

    /// Persist one record.
    async fn write_log(&self, record: &LogRecord) -> Result<()>;
}
