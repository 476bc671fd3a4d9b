//! Pipeline assembly: queue construction, worker spawn, shutdown.
//!
//! ```text
//!                         ┌──► encoder worker ──► segment files ─┐
//! capture ──► router ─────┤                                      ├──► retention engine
//!                         └──► change detector ──► snapshots ────┘      (ring + catalog,
//!                              │        │                                clip requests)
//!                              ▼        ▼
//!                           preview    OCR (optional)
//! ```
//!
//! Every queue is bounded drop-oldest; a single cancellation token fans
//! out to all workers. The returned handle carries the control sender,
//! the shared stats, and the sticky `encoder_failed` flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gstreamer as gst;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hindsight_capture::{platform_source, CaptureWorker, SourceFactory};
use hindsight_context::{ChangeDetector, ContextWorker, SnapshotWriter};
use hindsight_core::queue::DEFAULT_CAPACITY;
use hindsight_core::{
    bounded, ControlEvent, ControlState, DataDirs, PipelineEvent, PipelineStats, RecorderConfig,
};
use hindsight_encode::{probe_and_select, EncoderWorker, GstSegmentSink, MediaParams, SegmentSink};
use hindsight_retention::{Catalog, RetentionEngine, RingBuffer};

use crate::router::{self, RouterQueues};
use crate::{control, drain};

/// Capacity of the control-plane → retention request queue.
const RETENTION_QUEUE_CAPACITY: usize = 64;

pub struct Pipeline {
    control_tx: mpsc::Sender<ControlEvent>,
    stats: Arc<PipelineStats>,
    encoder_failed: Arc<AtomicBool>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the full pipeline with the platform capture source and the
    /// GStreamer segment sink.
    pub fn spawn(config: RecorderConfig) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        let sink = build_gst_sink();
        Self::spawn_with(config, Box::new(|| platform_source()), sink)
    }

    /// Spawn with injected capture/sink implementations. This is the seam
    /// integration tests drive the whole graph through.
    pub fn spawn_with(
        config: RecorderConfig,
        capture_factory: Box<dyn SourceFactory>,
        sink: Option<Box<dyn SegmentSink>>,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        let config = config.normalized();
        let dirs = DataDirs::prepare(&config.base_dir).context("preparing data directories")?;
        info!(
            "pipeline starting: mode={}, {}x{} @{}fps, {} segments × {} s",
            config.capture_mode,
            config.encode_width,
            config.encode_height,
            config.encode_fps,
            config.max_segments(),
            config.segment_duration_seconds
        );

        let cancel = CancellationToken::new();
        let stats = Arc::new(PipelineStats::new());
        let control_state = Arc::new(ControlState::new(config.capture_mode));
        let encoder_failed = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::channel(DEFAULT_CAPACITY);
        let mut tasks = Vec::new();

        // Inter-stage queues.
        let (capture_tx, capture_rx) = bounded(DEFAULT_CAPACITY);
        let (encoder_tx, encoder_rx) = bounded(DEFAULT_CAPACITY);
        let (detector_tx, detector_rx) = bounded(DEFAULT_CAPACITY);
        let (preview_tx, preview_rx) = bounded(DEFAULT_CAPACITY);
        let (ocr_tx, ocr_rx) = bounded(DEFAULT_CAPACITY);
        let (engine_tx, engine_rx) = bounded(RETENTION_QUEUE_CAPACITY);

        // Retention engine: ring recovery + catalog open happen before any
        // producer starts.
        let segment_duration = Duration::from_secs(config.segment_duration_seconds as u64);
        let ring = Arc::new(RingBuffer::recover(
            &dirs.focus_buffer,
            config.max_segments(),
            segment_duration,
        ));
        let catalog = Catalog::open(&dirs.index_db).context("opening context catalog")?;
        let engine = RetentionEngine::new(
            Arc::clone(&ring),
            catalog,
            dirs.clips.clone(),
            Duration::from_secs(config.context_retention_seconds),
            config.max_context_frames,
        );
        tasks.push(tokio::spawn(engine.run(engine_rx, cancel.child_token())));

        // Encoder worker (focus mode). A missing sink means the media
        // stack failed to come up: the encoder is born failed and the rest
        // of the pipeline keeps running.
        match sink {
            Some(sink) => {
                let params = MediaParams {
                    width: config.encode_width,
                    height: config.encode_height,
                    fps: config.encode_fps,
                    bitrate_kbps: config.bitrate_kbps,
                };
                let encoder = EncoderWorker::new(
                    sink,
                    params,
                    config.frames_per_segment(),
                    dirs.focus_buffer.clone(),
                    Arc::clone(&encoder_failed),
                    engine_tx.clone(),
                    events_tx.clone(),
                    Arc::clone(&stats),
                );
                tasks.push(tokio::spawn(encoder.run(encoder_rx, cancel.child_token())));
            }
            None => {
                error!("no segment sink available; focus encoding is disabled for this run");
                encoder_failed.store(true, Ordering::Relaxed);
                drop(encoder_rx);
            }
        }

        // Context worker.
        let context_worker = ContextWorker::new(
            ChangeDetector::new(config.change_threshold),
            SnapshotWriter::new(dirs.context_buffer.clone(), config.jpeg_quality),
            engine_tx.clone(),
            events_tx.clone(),
            Arc::clone(&stats),
        );
        tasks.push(tokio::spawn(
            context_worker.run(detector_rx, cancel.child_token()),
        ));

        // Side-stage drains.
        tasks.push(tokio::spawn(drain::preview(
            preview_rx,
            events_tx.clone(),
            cancel.child_token(),
        )));
        if config.ocr_enabled {
            tasks.push(tokio::spawn(drain::ocr(ocr_rx, cancel.child_token())));
        } else {
            drop(ocr_rx);
        }

        // Router.
        tasks.push(tokio::spawn(router::run(
            capture_rx,
            RouterQueues {
                encoder: encoder_tx,
                detector: detector_tx,
                preview: preview_tx,
                ocr: config.ocr_enabled.then_some(ocr_tx),
            },
            Arc::clone(&control_state),
            Arc::clone(&stats),
            cancel.child_token(),
        )));

        // Capture worker at the head of the graph.
        let capture = CaptureWorker::new(
            capture_factory,
            Arc::clone(&control_state),
            capture_tx,
            Arc::clone(&stats),
        );
        tasks.push(tokio::spawn(capture.run(cancel.child_token())));

        // Control-plane adapter.
        let (control_tx, control_rx) = mpsc::channel(RETENTION_QUEUE_CAPACITY);
        tasks.push(tokio::spawn(control::run(
            control_rx,
            Arc::clone(&control_state),
            engine_tx,
            cancel.child_token(),
        )));

        Ok((
            Self {
                control_tx,
                stats,
                encoder_failed,
                cancel,
                tasks,
            },
            events_rx,
        ))
    }

    /// Sender for control-plane events (mode, pause, running, clips).
    pub fn control_tx(&self) -> mpsc::Sender<ControlEvent> {
        self.control_tx.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Sticky encoder failure flag.
    pub fn encoder_failed(&self) -> bool {
        self.encoder_failed.load(Ordering::Relaxed)
    }

    /// Cancel every worker and wait for them to drain.
    pub async fn shutdown(self) {
        info!("pipeline shutting down ({})", self.stats);
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("worker join failed: {err}");
            }
        }
        info!("pipeline stopped");
    }
}

/// Bring up GStreamer and pick the H.264 encoder. `None` means the media
/// stack is unusable; the pipeline then runs with a failed encoder.
fn build_gst_sink() -> Option<Box<dyn SegmentSink>> {
    if let Err(err) = gst::init() {
        error!("GStreamer initialization failed: {err}");
        return None;
    }
    let encoder_name = match probe_and_select() {
        Some(candidate) => candidate.name,
        None => {
            warn!("falling back to x264enc");
            "x264enc".to_string()
        }
    };
    Some(Box::new(GstSegmentSink::new(encoder_name)))
}
