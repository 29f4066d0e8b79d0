//! PostgreSQL persistence backend.

use std::str::FromStr;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use logfold_core::defaults::QUERY_PAGE_LIMIT;
use logfold_core::{Error, Level, LogFilter, LogRecord, LogStore, RecordStream, Result};

use crate::pool::create_pg_pool;
use crate::query::{build_where, Placeholder, QueryParam};

const SELECT_COLUMNS: &str =
    "level, source, group_name, message, message_json, recorded_at, received_at";

/// [`LogStore`] backed by PostgreSQL. The message regex predicate is pushed
/// into SQL via the `~` operator.
pub struct PgLogStore {
    pool: PgPool,
}

impl PgLogStore {
    /// Connect a new store with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self {
            pool: create_pg_pool(database_url).await?,
        })
    }

    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<LogRecord> {
        let level: String = row.try_get("level")?;
        let level = Level::from_str(&level).map_err(Error::Serialization)?;

        let message_json: Option<serde_json::Value> = row.try_get("message_json")?;
        let message_json = match message_json {
            Some(serde_json::Value::Object(map)) => Some(map),
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
impl LogStore for PgLogStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS logs (
                id BIGSERIAL PRIMARY KEY,
                level TEXT NOT NULL,
                source TEXT,
                group_name TEXT,
                message TEXT NOT NULL,
                message_json JSONB,
                recorded_at TIMESTAMPTZ NOT NULL,
                received_at TIMESTAMPTZ
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
        let clause = build_where(filter, Placeholder::Dollar);
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
        let records: Vec<Result<LogRecord>> = rows.iter().map(Self::parse_row).collect();
        Ok(futures::stream::iter(records).boxed())
    }

    async fn write_log(&self, record: &LogRecord) -> Result<()> {
        let message_json = record
            .message_json
            .as_ref()
            .map(|map| serde_json::Value::Object(map.clone()));

        sqlx::query(
            "INSERT INTO logs (level, source, group_name, message, message_json, recorded_at, received_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
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
