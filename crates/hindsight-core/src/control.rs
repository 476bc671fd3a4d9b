//! Control state shared between the control plane and the pipeline.
//!
//! The capture worker reads this record on every iteration, so it is a
//! set of atomics rather than a lock. Only the control plane mutates it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::errors::ClipError;
use crate::types::{ClipOutcome, ClipRequest};

// ── CaptureMode ───────────────────────────────────────────────────────────────

/// The two mutually exclusive retention strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// 30 fps into rolling MP4 segments.
    Focus,
    /// 1 fps into a change-gated snapshot catalog.
    Context,
}

impl CaptureMode {
    /// Minimum spacing between emitted frames in this mode.
    pub fn frame_interval(self) -> Duration {
        match self {
            // 1000/30 ms
            CaptureMode::Focus => Duration::from_micros(1_000_000 / 30),
            CaptureMode::Context => Duration::from_millis(1000),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            CaptureMode::Focus => 0,
            CaptureMode::Context => 1,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => CaptureMode::Focus,
            _ => CaptureMode::Context,
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Focus => write!(f, "focus"),
            CaptureMode::Context => write!(f, "context"),
        }
    }
}

// ── ControlState ──────────────────────────────────────────────────────────────

/// Atomically readable run state: current mode, paused, running.
///
/// Mode changes take effect on the next capture iteration; nothing here
/// blocks, and no stage holds a lock across a read.
#[derive(Debug)]
pub struct ControlState {
    mode: AtomicU8,
    paused: AtomicBool,
    running: AtomicBool,
}

impl ControlState {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.to_u8()),
            paused: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        CaptureMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: CaptureMode) {
        self.mode.store(mode.to_u8(), Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// True when the capture worker should acquire frames.
    pub fn is_capturing(&self) -> bool {
        self.is_running() && !self.is_paused()
    }
}

// ── ControlEvent ──────────────────────────────────────────────────────────────

/// Input alphabet of the control plane (tray, overlay, hotkeys — all
/// external to the core). Applied by the control adapter.
#[derive(Debug)]
pub enum ControlEvent {
    SetMode(CaptureMode),
    SetPaused(bool),
    SetRunning(bool),
    RequestClip {
        request: ClipRequest,
        reply: oneshot::Sender<Result<Option<ClipOutcome>, ClipError>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_running_unpaused() {
        let state = ControlState::new(CaptureMode::Focus);
        assert!(state.is_running());
        assert!(!state.is_paused());
        assert!(state.is_capturing());
        assert_eq!(state.mode(), CaptureMode::Focus);
    }

    #[test]
    fn pause_and_stop_both_idle_the_capture() {
        let state = ControlState::new(CaptureMode::Context);
        state.set_paused(true);
        assert!(!state.is_capturing());
        state.set_paused(false);
        state.set_running(false);
        assert!(!state.is_capturing());
    }

    #[test]
    fn mode_round_trips_through_the_atomic() {
        let state = ControlState::new(CaptureMode::Focus);
        state.set_mode(CaptureMode::Context);
        assert_eq!(state.mode(), CaptureMode::Context);
        state.set_mode(CaptureMode::Focus);
        assert_eq!(state.mode(), CaptureMode::Focus);
    }

    #[test]
    fn focus_interval_is_a_thirtieth_of_a_second() {
        assert_eq!(
            CaptureMode::Focus.frame_interval(),
            Duration::from_micros(33_333)
        );
        assert_eq!(
            CaptureMode::Context.frame_interval(),
            Duration::from_secs(1)
        );
    }
}
