//! hindsight-encode — the focus-mode stage: hardware H.264 encoder
//! selection, BGRA→NV12 conversion, and fixed-duration MP4 segment
//! writing.
//!
//! The encoder worker consumes raw frames, rolls a new segment every
//! `fps × segment_duration_seconds` frames, and announces each finalized
//! segment to the retention engine. Encoder failure is sticky: the worker
//! stops consuming and the rest of the pipeline keeps running.

pub mod nv12;
pub mod segment;
pub mod select;
pub mod worker;

pub use nv12::Nv12Converter;
pub use segment::{GstSegmentSink, MediaParams, SegmentSink};
pub use select::{probe_and_select, select_encoder, EncoderCandidate, Vendor};
pub use worker::EncoderWorker;
