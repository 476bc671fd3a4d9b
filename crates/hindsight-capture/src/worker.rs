//! Capture worker: paced acquisition with session recovery.
//!
//! One long-lived loop per process. Each iteration reads the atomic
//! control state, enforces the per-mode frame interval against a
//! monotonic clock, and performs at most one acquisition. Timeouts fall
//! back to repeating the last good frame with a fresh timestamp; access
//! loss tears the session down and rebuilds it after a backoff. Nothing
//! in here is fatal while the pipeline lives.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hindsight_core::{CaptureError, ControlState, PipelineStats, QueueSender, RawFrame};

use crate::{FrameSource, SourceFrame};

/// Backoff before re-initializing a torn-down session.
pub const REINIT_DELAY: Duration = Duration::from_secs(1);
/// Per-call acquisition timeout; short so cancellation is seen promptly.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);
/// Sleep while paused or stopped.
const IDLE_SLEEP: Duration = Duration::from_millis(50);
/// Sleep between rate-limit checks.
const RATE_CHECK_SLEEP: Duration = Duration::from_millis(1);

/// Builds (and rebuilds) the duplication session.
pub trait SourceFactory: Send {
    fn create(&mut self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

impl<F> SourceFactory for F
where
    F: FnMut() -> Result<Box<dyn FrameSource>, CaptureError> + Send,
{
    fn create(&mut self) -> Result<Box<dyn FrameSource>, CaptureError> {
        self()
    }
}

pub struct CaptureWorker {
    factory: Box<dyn SourceFactory>,
    control: Arc<ControlState>,
    out: QueueSender<RawFrame>,
    stats: Arc<PipelineStats>,
    reinit_delay: Duration,
}

impl CaptureWorker {
    pub fn new(
        factory: Box<dyn SourceFactory>,
        control: Arc<ControlState>,
        out: QueueSender<RawFrame>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            factory,
            control,
            out,
            stats,
            reinit_delay: REINIT_DELAY,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("capture worker started");
        let origin = Instant::now();
        let mut session: Option<Box<dyn FrameSource>> = None;
        let mut last_frame: Option<SourceFrame> = None;
        let mut last_emit: Option<Instant> = None;
        let mut initialized_once = false;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if !self.control.is_capturing() {
                if sleep_or_cancel(&cancel, IDLE_SLEEP).await {
                    break;
                }
                continue;
            }

            let interval = self.control.mode().frame_interval();
            if !frame_due(last_emit, Instant::now(), interval) {
                if sleep_or_cancel(&cancel, RATE_CHECK_SLEEP).await {
                    break;
                }
                continue;
            }

            if session.is_none() {
                match self.factory.create() {
                    Ok(source) => {
                        if initialized_once {
                            self.stats.session_reinit();
                            info!("duplication session re-initialized");
                        } else {
                            initialized_once = true;
                            info!("duplication session initialized");
                        }
                        session = Some(source);
                    }
                    Err(err) => {
                        warn!(
                            "capture initialization failed: {err}; retrying in {:?}",
                            self.reinit_delay
                        );
                        if sleep_or_cancel(&cancel, self.reinit_delay).await {
                            break;
                        }
                        continue;
                    }
                }
            }
            let Some(source) = session.as_mut() else {
                continue;
            };

            match source.acquire(ACQUIRE_TIMEOUT).await {
                Ok(frame) => {
                    self.emit(&frame, origin);
                    self.stats.frame_captured();
                    last_frame = Some(frame);
                    last_emit = Some(Instant::now());
                }
                Err(CaptureError::WaitTimeout) => {
                    // Desktop unchanged. Repeat the last good frame with a
                    // fresh timestamp so downstream pacing holds; before
                    // the first good frame there is nothing to repeat.
                    if let Some(last) = &last_frame {
                        let repeat = last.clone();
                        self.emit(&repeat, origin);
                        self.stats.frame_repeated();
                        last_emit = Some(Instant::now());
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
                Err(CaptureError::AccessLost { reason }) => {
                    info!("duplication access lost ({reason}); rebuilding session");
                    session = None;
                    if sleep_or_cancel(&cancel, self.reinit_delay).await {
                        break;
                    }
                }
                Err(err) => {
                    warn!("acquisition failed ({err}); rebuilding session");
                    session = None;
                    if sleep_or_cancel(&cancel, self.reinit_delay).await {
                        break;
                    }
                }
            }
        }

        // Teardown: release the session and the repeat fallback.
        drop(session);
        drop(last_frame);
        info!("capture worker stopped");
    }

    fn emit(&self, frame: &SourceFrame, origin: Instant) {
        let raw = RawFrame {
            data: frame.data.clone(),
            width: frame.width,
            height: frame.height,
            timestamp_hns: (origin.elapsed().as_nanos() / 100) as i64,
        };
        if self.out.push(raw) == hindsight_core::Push::Displaced {
            self.stats.frame_dropped();
            debug!("capture queue overflowed; oldest frame dropped");
        }
    }
}

/// A frame is admitted when at least `interval` has elapsed since the
/// previous emission (or when nothing has been emitted yet).
fn frame_due(last_emit: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_emit {
        None => true,
        Some(prev) => now.duration_since(prev) >= interval,
    }
}

/// Returns true when the token fired before the sleep finished.
async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
