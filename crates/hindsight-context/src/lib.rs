//! hindsight-context — the context-mode stage: perceptual-hash change
//! detection plus JPEG snapshot persistence.
//!
//! Frames arrive at up to 1 fps from the router; only visually distinct
//! ones (Hamming distance above the configured threshold, at most one per
//! second) are written to disk and announced to the retention engine.

pub mod detector;
pub mod phash;
pub mod snapshot;
pub mod worker;

pub use detector::{ChangeDetector, Verdict, MIN_ACCEPT_INTERVAL};
pub use phash::PerceptualHash;
pub use snapshot::SnapshotWriter;
pub use worker::ContextWorker;
