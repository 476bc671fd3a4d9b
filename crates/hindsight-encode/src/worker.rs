//! Encoder worker: RawFrame consumer, segment state machine.
//!
//! ```text
//!            push_frame            frame_count ≥ fps·segment_secs
//!   Idle ───────────────► Writing ───────────────────────────────► Idle
//!     │                      │        (finalize, emit segment)
//!     └──── any sink error ──┴──────────────────────────────────► Failed
//! ```
//!
//! `Failed` is sticky for the process lifetime: timestamps are derived
//! from the frame counter, so skipping a bad sample would desync the file.
//! A failed worker logs, raises `encoder_failed`, and stops consuming; the
//! rest of the pipeline stays live.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hindsight_core::time::format_stamp;
use hindsight_core::{
    EngineCommand, PipelineEvent, PipelineStats, QueueReceiver, QueueSender, RawFrame,
    VideoSegment,
};

use crate::nv12::Nv12Converter;
use crate::segment::{MediaParams, SegmentSink};

enum SegmentState {
    Idle,
    Writing {
        path: PathBuf,
        started_at: DateTime<Utc>,
        frame_count: u64,
    },
    Failed,
}

pub struct EncoderWorker {
    sink: Box<dyn SegmentSink>,
    converter: Nv12Converter,
    params: MediaParams,
    frames_per_segment: u64,
    segment_dir: PathBuf,
    state: SegmentState,
    last_started_at: Option<DateTime<Utc>>,
    failed: Arc<AtomicBool>,
    engine_tx: QueueSender<EngineCommand>,
    events: mpsc::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
}

impl EncoderWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sink: Box<dyn SegmentSink>,
        params: MediaParams,
        frames_per_segment: u64,
        segment_dir: PathBuf,
        failed: Arc<AtomicBool>,
        engine_tx: QueueSender<EngineCommand>,
        events: mpsc::Sender<PipelineEvent>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            sink,
            converter: Nv12Converter::new(params.width, params.height),
            params,
            frames_per_segment: frames_per_segment.max(1),
            segment_dir,
            state: SegmentState::Idle,
            last_started_at: None,
            failed,
            engine_tx,
            events,
            stats,
        }
    }

    /// Sticky failure flag, shared with the pipeline handle.
    pub fn failed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failed)
    }

    pub async fn run(mut self, mut rx: QueueReceiver<RawFrame>, cancel: CancellationToken) {
        info!(
            "encoder worker started ({}x{} @{}fps, {} frames/segment)",
            self.params.width, self.params.height, self.params.fps, self.frames_per_segment
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.flush();
                    break;
                }
                maybe = rx.recv() => {
                    let Some(frame) = maybe else {
                        self.flush();
                        break;
                    };
                    self.push_frame(&frame);
                    if matches!(self.state, SegmentState::Failed) {
                        error!("encoder failed; no further frames will be consumed");
                        break;
                    }
                }
            }
        }
        info!("encoder worker stopped");
    }

    /// Feed one frame through the state machine. Ignored when failed or
    /// when the buffer does not cover the encode geometry.
    pub fn push_frame(&mut self, frame: &RawFrame) {
        if matches!(self.state, SegmentState::Failed) {
            return;
        }
        let needed = RawFrame::expected_len(self.params.width, self.params.height);
        if frame.data.len() < needed {
            warn!(
                "frame buffer too small for encode geometry ({} < {needed}), ignoring",
                frame.data.len()
            );
            return;
        }

        if matches!(self.state, SegmentState::Idle) {
            if let Err(err) = self.begin_segment() {
                self.fail(&format!("begin_segment: {err}"));
                return;
            }
        }

        let sample_duration = self.params.sample_duration_hns();
        let SegmentState::Writing { frame_count, .. } = &mut self.state else {
            return;
        };
        let sample_time = *frame_count as i64 * sample_duration;

        let nv12 = self.converter.convert(&frame.data);
        if let Err(err) = self.sink.write_sample(nv12, sample_time, sample_duration) {
            self.fail(&format!("write_sample: {err}"));
            return;
        }

        let SegmentState::Writing { frame_count, .. } = &mut self.state else {
            return;
        };
        *frame_count += 1;
        let reached = *frame_count;
        self.stats.frame_encoded();

        if reached >= self.frames_per_segment {
            self.finalize_segment();
        }
    }

    /// Force-finalize the open segment, if any.
    pub fn flush(&mut self) {
        if matches!(self.state, SegmentState::Writing { .. }) {
            self.finalize_segment();
        }
    }

    fn begin_segment(&mut self) -> Result<(), hindsight_core::EncodeError> {
        // Stamps are millisecond-precision and the ring is ordered by
        // them; rolling several segments inside one tick must neither
        // reuse a live file name nor mint a stamp behind the previous
        // segment's.
        let mut started_at = Utc::now();
        if let Some(prev) = self.last_started_at {
            if started_at <= prev {
                started_at = prev + chrono::TimeDelta::milliseconds(1);
            }
        }
        let mut path = self.segment_path(started_at);
        while path.exists() {
            started_at += chrono::TimeDelta::milliseconds(1);
            path = self.segment_path(started_at);
        }

        self.sink.begin(&path, &self.params)?;
        self.last_started_at = Some(started_at);
        self.state = SegmentState::Writing {
            path,
            started_at,
            frame_count: 0,
        };
        Ok(())
    }

    fn finalize_segment(&mut self) {
        let SegmentState::Writing {
            path,
            started_at,
            frame_count,
        } = std::mem::replace(&mut self.state, SegmentState::Idle)
        else {
            return;
        };

        if let Err(err) = self.sink.finalize() {
            self.fail(&format!("finalize: {err}"));
            return;
        }

        let duration_hns = frame_count as i64 * self.params.sample_duration_hns();
        let segment = VideoSegment {
            path,
            started_at,
            duration: Duration::from_nanos(duration_hns as u64 * 100),
        };
        self.stats.segment_completed();
        self.engine_tx
            .push(EngineCommand::SegmentComplete(segment.clone()));
        let _ = self.events.try_send(PipelineEvent::SegmentComplete(segment));
    }

    fn segment_path(&self, at: DateTime<Utc>) -> PathBuf {
        self.segment_dir.join(format!("{}.mp4", format_stamp(at)))
    }

    fn fail(&mut self, reason: &str) {
        error!("encoder entering failed state: {reason}");
        self.state = SegmentState::Failed;
        self.failed.store(true, Ordering::Relaxed);
    }
}
