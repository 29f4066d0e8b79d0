//! # logfold-db
//!
//! Persistence backends for logfold.
//!
//! This crate provides:
//! - Connection pool management for Postgres and SQLite
//! - A parameterized WHERE-clause builder projecting [`logfold_core::LogFilter`]
//! - [`PgLogStore`] and [`SqliteLogStore`], the two `LogStore` implementations

pub mod pool;
pub mod postgres;
pub mod query;
pub mod sqlite;

pub use pool::{create_pg_pool, create_pg_pool_with_config, create_sqlite_pool, PoolConfig};
pub use postgres::PgLogStore;
pub use query::{build_where, Placeholder, QueryParam, WhereClause};
pub use sqlite::SqliteLogStore;

/// Escape LIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
