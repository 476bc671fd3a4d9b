use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::errors::ClipError;

// ── RawFrame ──────────────────────────────────────────────────────────────────

/// One uncompressed capture: BGRA pixels (byte 0 = blue, byte 2 = red),
/// 8 bits per channel, plus a monotonic timestamp in 100-ns units assigned
/// at acquisition.
///
/// The pixel buffer is a [`Bytes`], so cloning a frame to fan it out across
/// the encoder, preview, and OCR queues shares the allocation instead of
/// copying it.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Monotonic acquisition timestamp, 100-ns units.
    pub timestamp_hns: i64,
}

impl RawFrame {
    /// Expected byte length of a BGRA buffer for this geometry.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Whether the pixel buffer covers the declared geometry.
    pub fn is_complete(&self) -> bool {
        self.data.len() >= Self::expected_len(self.width, self.height)
    }
}

// ── VideoSegment ──────────────────────────────────────────────────────────────

/// A finalized MP4 segment on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSegment {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl VideoSegment {
    /// End of the segment's half-open time range `[started_at, end)`.
    pub fn end(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }
}

// ── ContextSnapshot ───────────────────────────────────────────────────────────

/// A persisted context-mode still: JPEG file plus its catalog attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    /// Compact perceptual hash (XOR of the four 64-bit hash words).
    pub compact_hash: u64,
}

// ── Clip request / outcome ────────────────────────────────────────────────────

/// A user request to materialize the trailing `duration` of focus footage.
#[derive(Debug, Clone, Copy)]
pub struct ClipRequest {
    pub requested_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Result of a successful clip materialization. `span` is the time range
/// actually covered, which can be narrower than requested when the ring
/// holds less history.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipOutcome {
    pub path: PathBuf,
    pub span_start: DateTime<Utc>,
    pub span_end: DateTime<Utc>,
    pub segment_count: usize,
}

// ── Pipeline events ───────────────────────────────────────────────────────────

/// Event outputs of the core pipeline, consumed by the embedding shell
/// (tray/overlay UI, tests, or just the log drain).
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    SegmentComplete(VideoSegment),
    SnapshotRecorded(ContextSnapshot),
    PreviewFrame(RawFrame),
}

// ── Retention engine commands ─────────────────────────────────────────────────

/// Inputs to the retention engine worker. Segment and snapshot
/// notifications come from the encoder and change-detector stages; clip
/// requests come from the control plane and reply over a oneshot.
#[derive(Debug)]
pub enum EngineCommand {
    SegmentComplete(VideoSegment),
    SnapshotRecorded(ContextSnapshot),
    Clip {
        request: ClipRequest,
        reply: oneshot::Sender<Result<Option<ClipOutcome>, ClipError>>,
    },
}
