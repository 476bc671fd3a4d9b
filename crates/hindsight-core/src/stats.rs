//! Shared pipeline counters.
//!
//! Cheap `Relaxed` atomics incremented by the workers and read by whoever
//! embeds the pipeline (status UI, periodic log line, tests).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_repeated: AtomicU64,
    session_reinits: AtomicU64,
    frames_encoded: AtomicU64,
    segments_completed: AtomicU64,
    snapshots_recorded: AtomicU64,
    frames_dropped: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_repeated(&self) {
        self.frames_repeated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_reinit(&self) {
        self.session_reinits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn segment_completed(&self) {
        self.segments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_recorded(&self) {
        self.snapshots_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_repeated(&self) -> u64 {
        self.frames_repeated.load(Ordering::Relaxed)
    }

    pub fn session_reinits(&self) -> u64 {
        self.session_reinits.load(Ordering::Relaxed)
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded.load(Ordering::Relaxed)
    }

    pub fn segments_completed(&self) -> u64 {
        self.segments_completed.load(Ordering::Relaxed)
    }

    pub fn snapshots_recorded(&self) -> u64 {
        self.snapshots_recorded.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured={} repeated={} reinits={} encoded={} segments={} snapshots={} dropped={}",
            self.frames_captured(),
            self.frames_repeated(),
            self.session_reinits(),
            self.frames_encoded(),
            self.segments_completed(),
            self.snapshots_recorded(),
            self.frames_dropped(),
        )
    }
}
