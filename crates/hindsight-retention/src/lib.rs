//! hindsight-retention — the two retention engines and their worker.
//!
//! Focus mode's [`RingBuffer`] mirrors the MP4 segments on disk and evicts
//! past a segment-count cap; context mode's [`Catalog`] is a SQLite index
//! of snapshots under a rolling time window. [`engine::RetentionEngine`]
//! drives both from a single command queue and materializes clips on
//! request.

pub mod catalog;
pub mod clips;
pub mod engine;
pub mod ring;

pub use catalog::{Catalog, CatalogRow};
pub use engine::RetentionEngine;
pub use ring::RingBuffer;
