//! Retention engine worker.
//!
//! Owns the focus ring buffer and the context catalog. One command queue
//! feeds it: segment-complete notifications append to the ring,
//! snapshot-recorded notifications insert into the catalog (followed by a
//! rolling-window sweep), clip requests resolve against the ring and reply
//! over a oneshot. `enforce_max` runs on a coarse interval so a burst of
//! distinct frames cannot grow the catalog without bound between sweeps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hindsight_core::{EngineCommand, QueueReceiver};

use crate::catalog::Catalog;
use crate::clips;
use crate::ring::RingBuffer;

/// Cadence of the `enforce_max` sweep.
const ENFORCE_INTERVAL: Duration = Duration::from_secs(30);

pub struct RetentionEngine {
    ring: Arc<RingBuffer>,
    catalog: Catalog,
    clips_dir: PathBuf,
    retention_window: Duration,
    max_context_frames: usize,
}

impl RetentionEngine {
    pub fn new(
        ring: Arc<RingBuffer>,
        catalog: Catalog,
        clips_dir: PathBuf,
        retention_window: Duration,
        max_context_frames: usize,
    ) -> Self {
        Self {
            ring,
            catalog,
            clips_dir,
            retention_window,
            max_context_frames,
        }
    }

    pub async fn run(mut self, mut rx: QueueReceiver<EngineCommand>, cancel: CancellationToken) {
        // Startup reconciliation: rows whose files vanished while we were
        // not running are dropped before anything else happens.
        match self.catalog.reconcile() {
            Ok(pruned) => info!("retention engine up ({pruned} stale catalog row(s) pruned)"),
            Err(err) => error!("startup reconcile failed: {err:#}"),
        }

        let mut enforce_timer = tokio::time::interval(ENFORCE_INTERVAL);
        enforce_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        enforce_timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = enforce_timer.tick() => {
                    if let Err(err) = self.catalog.enforce_max(self.max_context_frames) {
                        warn!("enforce_max failed: {err:#}");
                    }
                }
                maybe = rx.recv() => {
                    let Some(command) = maybe else { break };
                    self.handle(command);
                }
            }
        }
        // Dropping the engine closes the catalog handle.
        info!("retention engine stopped");
    }

    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SegmentComplete(segment) => {
                self.ring.add_segment(segment);
            }
            EngineCommand::SnapshotRecorded(snapshot) => {
                if let Err(err) = self.catalog.insert(&snapshot) {
                    // The insert is lost; the file stays for the next
                    // reconcile-era cleanup.
                    error!("catalog insert failed: {err:#}");
                    return;
                }
                let cutoff = Utc::now()
                    - chrono::TimeDelta::from_std(self.retention_window)
                        .unwrap_or_else(|_| chrono::TimeDelta::MAX);
                if let Err(err) = self.catalog.delete_before(cutoff.timestamp_millis()) {
                    warn!("retention sweep failed: {err:#}");
                }
            }
            EngineCommand::Clip { request, reply } => {
                let result = clips::materialize(&self.ring, &self.clips_dir, &request);
                if let Err(err) = &result {
                    warn!("clip materialization failed: {err}");
                }
                let _ = reply.send(result);
            }
        }
    }
}
