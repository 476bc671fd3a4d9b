//! hindsight-capture — desktop-duplication capture for the recorder.
//!
//! # Windows pipeline
//!
//! ```text
//! D3D11CreateDevice → IDXGIDevice → IDXGIAdapter → EnumOutputs(0)
//!   │  IDXGIOutput1::DuplicateOutput
//!   ▼
//! IDXGIOutputDuplication::AcquireNextFrame(100 ms)
//!   │  CopyResource → staging texture → Map (row pitch honored)
//!   ▼
//! BGRA bytes (HDR outputs tone-mapped on the CPU) → CaptureWorker
//! ```
//!
//! On non-Windows targets a stub source is compiled so the workspace
//! builds and the worker's pacing/recovery logic stays testable.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use hindsight_core::CaptureError;

pub mod tonemap;
pub mod worker;

#[cfg(windows)]
mod duplication;
#[cfg(windows)]
pub use duplication::DuplicationSource;

#[cfg(not(windows))]
mod stub;
#[cfg(not(windows))]
pub use stub::StubSource;

pub use worker::{CaptureWorker, SourceFactory};

// ── FrameSource ───────────────────────────────────────────────────────────────

/// One acquired desktop frame, already in 8-bit BGRA.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

/// A duplication session. The capture worker owns exactly one at a time
/// and rebuilds it through its factory whenever the session reports
/// [`CaptureError::AccessLost`] or anything unexpected.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait up to `timeout` for the next frame.
    async fn acquire(&mut self, timeout: Duration) -> Result<SourceFrame, CaptureError>;
}

/// Build the platform's frame source.
pub fn platform_source() -> Result<Box<dyn FrameSource>, CaptureError> {
    #[cfg(windows)]
    {
        Ok(Box::new(DuplicationSource::new()?))
    }
    #[cfg(not(windows))]
    {
        Ok(Box::new(StubSource::new()))
    }
}
