//! Control-plane adapter.
//!
//! The tray/overlay UI and global hotkeys live outside the core; they
//! reach it through a channel of [`ControlEvent`]s. This task applies
//! state changes to the shared atomics and forwards clip requests to the
//! retention engine's queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hindsight_core::{ControlEvent, ControlState, EngineCommand, Push, QueueSender};

pub async fn run(
    mut rx: mpsc::Receiver<ControlEvent>,
    control: Arc<ControlState>,
    engine_tx: QueueSender<EngineCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(event) = maybe else { break };
                apply(event, &control, &engine_tx);
            }
        }
    }
}

fn apply(event: ControlEvent, control: &ControlState, engine_tx: &QueueSender<EngineCommand>) {
    match event {
        ControlEvent::SetMode(mode) => {
            info!("mode -> {mode}");
            control.set_mode(mode);
        }
        ControlEvent::SetPaused(paused) => {
            info!("paused -> {paused}");
            control.set_paused(paused);
        }
        ControlEvent::SetRunning(running) => {
            info!("running -> {running}");
            control.set_running(running);
        }
        ControlEvent::RequestClip { request, reply } => {
            info!(
                "clip requested: last {:?} before {}",
                request.duration, request.requested_at
            );
            if engine_tx.push(EngineCommand::Clip { request, reply }) == Push::Closed {
                warn!("retention engine is gone; clip request dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    use hindsight_core::{bounded, CaptureMode, ClipRequest};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn events_mutate_the_shared_state() {
        let control = Arc::new(ControlState::new(CaptureMode::Focus));
        let (engine_tx, _engine_rx) = bounded(64);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(rx, Arc::clone(&control), engine_tx, cancel.clone()));

        tx.send(ControlEvent::SetMode(CaptureMode::Context)).await.unwrap();
        tx.send(ControlEvent::SetPaused(true)).await.unwrap();
        tx.send(ControlEvent::SetRunning(false)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(control.mode(), CaptureMode::Context);
        assert!(control.is_paused());
        assert!(!control.is_running());
        cancel.cancel();
    }

    #[tokio::test]
    async fn clip_requests_are_forwarded_to_the_engine_queue() {
        let control = Arc::new(ControlState::new(CaptureMode::Focus));
        let (engine_tx, mut engine_rx) = bounded(64);
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        tokio::spawn(run(rx, control, engine_tx, cancel.clone()));

        let (reply_tx, _reply_rx) = oneshot::channel();
        tx.send(ControlEvent::RequestClip {
            request: ClipRequest {
                requested_at: Utc::now(),
                duration: Duration::from_secs(10),
            },
            reply: reply_tx,
        })
        .await
        .unwrap();

        let forwarded = engine_rx.recv().await.unwrap();
        assert!(matches!(forwarded, EngineCommand::Clip { .. }));
        cancel.cancel();
    }
}
