//! # logfold-store
//!
//! In-memory retention and streaming layer for logfold.
//!
//! This crate provides:
//! - A bounded [`RingBuffer`] with backwards-walking cursors, live listener
//!   fan-out with slow-consumer eviction, a displacement hook, and backfill
//! - A capacity-bounded insertion-ordered [`FixedHashSet`]
//! - The [`LogManager`] that serializes all ingest through one drain task
//!   and owns the filter cache
//! - The per-subscription [`Reader`] chunk-streaming state machine

pub mod hashset;
pub mod manager;
pub mod reader;
pub mod ring;

#[cfg(test)]
pub(crate) mod testing;

pub use hashset::{FixedHashSet, SetElement};
pub use manager::{FilterCache, LogManager};
pub use reader::{Chunk, Reader};
pub use ring::{Displace, Element, RingBuffer};
