//! # logfold-core
//!
//! Core types, traits, and abstractions for the logfold log aggregation
//! service.
//!
//! This crate provides the record model, the composable log filter, the
//! persistence trait, and the shared constants that the other logfold
//! crates depend on.

pub mod defaults;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use filter::{FieldFilter, LogFilter};
pub use models::{Level, LogRecord};
pub use traits::{Fingerprint, LogStore, RecordStream};
