//! hindsight — dual-mode rolling screen recorder.
//!
//! Focus mode keeps the last N five-second H.264 segments and can
//! materialize the recent past as a clip; context mode keeps a catalog of
//! visually distinct snapshots under a rolling window. The tray/overlay
//! UI is a separate process surface; this binary runs the capture →
//! retention core and exposes it through the control channel.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, trace, warn};
use tracing_subscriber::EnvFilter;

use hindsight_core::{PipelineEvent, RecorderConfig};
use hindsight_recorder::Pipeline;

const DEFAULT_CONFIG_PATH: &str = "hindsight.json";

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides; GST_DEBUG for GStreamer internals.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("hindsight v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(Path::new(&config_path))?;

    let (pipeline, mut events_rx) = Pipeline::spawn(config)?;

    let events = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PipelineEvent::SegmentComplete(segment) => info!(
                    "segment complete: {} ({:?})",
                    segment.path.display(),
                    segment.duration
                ),
                PipelineEvent::SnapshotRecorded(snapshot) => {
                    info!("snapshot recorded: {}", snapshot.path.display())
                }
                PipelineEvent::PreviewFrame(_) => trace!("preview frame"),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");

    if pipeline.encoder_failed() {
        warn!("encoder had failed during this run; check earlier logs");
    }
    pipeline.shutdown().await;
    events.abort();

    Ok(())
}

fn load_config(path: &Path) -> Result<RecorderConfig> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let config: RecorderConfig = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("configuration loaded from {}", path.display());
            Ok(config)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!("no configuration at {}; using defaults", path.display());
            Ok(RecorderConfig::default())
        }
        Err(err) => {
            error!("cannot read {}: {err}", path.display());
            Err(err).with_context(|| format!("reading {}", path.display()))
        }
    }
}
