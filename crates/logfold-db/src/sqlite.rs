//! SQLite persistence backend.
//!
//! Stock SQLite has no regex operator, so the message predicate cannot be
//! pushed into SQL; rows are fetched with the remaining predicates bound
//! and the full filter is re-applied in process before the page is
//! returned.

use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use logfold_core::defaults::QUERY_PAGE_LIMIT;
use logfold_core::{Error, Level, LogFilter, LogRecord, LogStore, RecordStream, Result};

use crate::pool::create_sqlite_pool;
use crate::query::{build_where, Placeholder, QueryParam};

const SELECT_COLUMNS: &str =
    "level, source, group_name, message, message_json, recorded_at, received_at";

/// [`LogStore`] backed by SQLite.
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self {
            pool: create_sqlite_pool(database_url).await?,
        })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &SqliteRow) -> Result<LogRecord> {
        let level: String = row.try_get("level")?;
        let level = Level::from_str(&level).map_err(Error::Serialization)?;

        let message_json: Option<String> = row.try_get("message_json")?;
        let message_json = match message_json.as_deref().map(serde_json::from_str) {
            Some(Ok(serde_json::Value::Object(map))) => Some(map),
            _ => None,
        };

        Ok(LogRecord {
            level,
            source: row.try_get("source")?,
            group: row.try_get("group_name")?,
            message: row.try_get("message")?,
            message_json,
            recorded_at: row.try_get("recorded_at")?,
            received_at: row.try_get("received_at")?,
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level TEXT NOT NULL,
                source TEXT,
                group_name TEXT,
                message TEXT NOT NULL,
                message_json TEXT,
                recorded_at TEXT NOT NULL,
                received_at TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_recorded_at ON logs (recorded_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<RecordStream> {
        let clause = build_where(filter, Placeholder::Question);
        let sql = format!(
            "SELECT {} FROM logs WHERE {} ORDER BY recorded_at DESC, id DESC LIMIT {}",
            SELECT_COLUMNS, clause.sql, QUERY_PAGE_LIMIT
        );

        let mut query = sqlx::query(&sql);
        for param in clause.params {
            query = match param {
                QueryParam::Text(text) => query.bind(text),
                QueryParam::Timestamp(at) => query.bind(at),
            };
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = Self::parse_row(row)?;
            // re-apply the full filter to cover the message regex
            if filter.matches(&record)? {
                records.push(Ok(record));
            }
        }
        Ok(futures::stream::iter(records).boxed())
    }

    async fn write_log(&self, record: &LogRecord) -> Result<()> {
        let message_json = record
            .message_json
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO logs (level, source, group_name, message, message_json, recorded_at, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.level.to_string())
        .bind(&record.source)
        .bind(&record.group)
        .bind(&record.message)
        .bind(message_json)
        .bind(record.recorded_at)
        .bind(record.received_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
