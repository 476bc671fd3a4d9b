//! Context worker: change detector queue consumer.
//!
//! ```text
//! router ─► detector queue ─► ChangeDetector ─► SnapshotWriter
//!                                   │                │
//!                                   │ accepted       ├─► retention engine
//!                                   ▼                └─► event stream
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hindsight_core::{
    EngineCommand, PipelineEvent, PipelineStats, QueueReceiver, QueueSender, RawFrame,
};

use crate::detector::{ChangeDetector, Verdict};
use crate::snapshot::SnapshotWriter;

pub struct ContextWorker {
    detector: ChangeDetector,
    writer: SnapshotWriter,
    engine_tx: QueueSender<EngineCommand>,
    events: mpsc::Sender<PipelineEvent>,
    stats: Arc<PipelineStats>,
}

impl ContextWorker {
    pub fn new(
        detector: ChangeDetector,
        writer: SnapshotWriter,
        engine_tx: QueueSender<EngineCommand>,
        events: mpsc::Sender<PipelineEvent>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            detector,
            writer,
            engine_tx,
            events,
            stats,
        }
    }

    pub async fn run(mut self, mut rx: QueueReceiver<RawFrame>, cancel: CancellationToken) {
        info!("context worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = rx.recv() => {
                    let Some(frame) = maybe else { break };
                    self.handle_frame(frame);
                }
            }
        }
        info!("context worker stopped");
    }

    fn handle_frame(&mut self, frame: RawFrame) {
        if !frame.is_complete() {
            warn!(
                "dropping short context frame ({} bytes for {}x{})",
                frame.data.len(),
                frame.width,
                frame.height
            );
            return;
        }

        match self
            .detector
            .evaluate(&frame.data, frame.width, frame.height, Instant::now())
        {
            Verdict::Accepted(hash) => {
                let taken_at = Utc::now();
                match self.writer.write(&frame, &hash, taken_at) {
                    Ok(snapshot) => {
                        self.stats.snapshot_recorded();
                        debug!("snapshot accepted: {}", snapshot.path.display());
                        self.engine_tx
                            .push(EngineCommand::SnapshotRecorded(snapshot.clone()));
                        let _ = self
                            .events
                            .try_send(PipelineEvent::SnapshotRecorded(snapshot));
                    }
                    Err(err) => warn!("snapshot write failed: {err:#}"),
                }
            }
            Verdict::Throttled => debug!("context frame throttled"),
            Verdict::Unchanged { distance } => {
                debug!("context frame unchanged (distance {distance})")
            }
        }
    }
}
