//! Centralized default constants for the logfold system.
//!
//! **This module is the single source of truth** for all shared default
//! values. The other crates reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// IN-MEMORY RETENTION
// =============================================================================

/// Default capacity of the primary log ring buffer.
pub const RING_CAPACITY: usize = 10_000;

/// Capacity of each listener delivery channel. A listener whose channel is
/// full at fan-out time is evicted as a slow consumer.
pub const LISTENER_BUFFER_SIZE: usize = 100;

/// Capacity of the per-manager filter cache (cached query-result rings,
/// keyed by filter fingerprint).
pub const FILTER_CACHE_CAPACITY: i64 = 50;

/// Number of records served per chunk request on a reader stream.
pub const CHUNK_SIZE: usize = 100;

/// Capacity of a cached query-result ring inside a filter-cache entry.
pub const CACHE_RING_CAPACITY: usize = CHUNK_SIZE;

// =============================================================================
// SERVER
// =============================================================================

/// Default listen address for the HTTP server.
pub const LISTEN_ADDR: &str = "0.0.0.0:8080";

/// SSE keep-alive interval in seconds.
pub const SSE_KEEPALIVE_SECS: u64 = 15;

/// Default tracing env-filter directive when `RUST_LOG` is unset.
pub const DEFAULT_ENV_FILTER: &str = "logfold=debug,tower_http=debug";

/// Directory served under `/static/`.
pub const STATIC_DIR: &str = "static";

// =============================================================================
// DATABASE
// =============================================================================

/// Default database connection URL.
pub const DATABASE_URL: &str = "postgres://localhost/logfold";

/// Maximum rows fetched per historical query page.
pub const QUERY_PAGE_LIMIT: i64 = 1_000;
