//! Structured logging field name constants for logfold.
//!
//! All crates use these constants for consistent structured logging fields,
//! so downstream aggregation tools can query by standardized names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-record iteration, high-volume data (chunk walks) |

/// Subsystem originating the log event.
/// Values: "api", "store", "db"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "ring", "manager", "reader", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "write", "read_chunk", "fan_out", "get_logs"
pub const OPERATION: &str = "op";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records emitted by a chunk or query.
pub const RESULT_COUNT: &str = "result_count";

/// Chunk sequence number on a reader stream.
pub const CHUNK: &str = "chunk";

/// Canonical SQL projection of the active filter.
pub const FILTER: &str = "filter";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
