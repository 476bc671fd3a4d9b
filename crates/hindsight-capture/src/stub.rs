//! Non-Windows stand-in for the duplication session.
//!
//! Emits no frames — it reports a timeout on every acquire — so the rest
//! of the pipeline (and its tests) run on any platform.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use hindsight_core::CaptureError;

use crate::{FrameSource, SourceFrame};

pub struct StubSource;

impl StubSource {
    pub fn new() -> Self {
        warn!("desktop duplication is Windows-only; the stub source produces no frames");
        Self
    }
}

impl Default for StubSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSource for StubSource {
    async fn acquire(&mut self, timeout: Duration) -> Result<SourceFrame, CaptureError> {
        tokio::time::sleep(timeout).await;
        Err(CaptureError::WaitTimeout)
    }
}
