//! Frame router: one consumer of the capture queue, fanning out per mode.
//!
//! Focus frames go to the encoder, context frames to the change detector
//! — exactly one of the two per frame, chosen by the control state at
//! forwarding time. Every frame is also offered to the preview queue, and
//! to the OCR queue when that side-stage is enabled. All pushes are
//! non-blocking; overflow displaces the oldest element downstream.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hindsight_core::{
    CaptureMode, ControlState, PipelineStats, Push, QueueReceiver, QueueSender, RawFrame,
};

pub struct RouterQueues {
    pub encoder: QueueSender<RawFrame>,
    pub detector: QueueSender<RawFrame>,
    pub preview: QueueSender<RawFrame>,
    pub ocr: Option<QueueSender<RawFrame>>,
}

pub async fn run(
    mut rx: QueueReceiver<RawFrame>,
    queues: RouterQueues,
    control: Arc<ControlState>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
) {
    info!("router started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(frame) = maybe else { break };

                // Side stages first: the frame payload is shared, so these
                // clones are reference bumps, not pixel copies.
                let _ = queues.preview.push(frame.clone());
                if let Some(ocr) = &queues.ocr {
                    let _ = ocr.push(frame.clone());
                }

                let outcome = match control.mode() {
                    CaptureMode::Focus => queues.encoder.push(frame),
                    CaptureMode::Context => queues.detector.push(frame),
                };
                if outcome == Push::Displaced {
                    stats.frame_dropped();
                    debug!("stage queue overflowed; oldest frame dropped");
                }
            }
        }
    }
    info!("router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hindsight_core::bounded;

    fn frame(tag: u8) -> RawFrame {
        RawFrame {
            data: Bytes::from(vec![tag; 16]),
            width: 2,
            height: 2,
            timestamp_hns: tag as i64,
        }
    }

    struct Harness {
        capture_tx: QueueSender<RawFrame>,
        encoder_rx: QueueReceiver<RawFrame>,
        detector_rx: QueueReceiver<RawFrame>,
        preview_rx: QueueReceiver<RawFrame>,
        ocr_rx: Option<QueueReceiver<RawFrame>>,
        control: Arc<ControlState>,
        cancel: CancellationToken,
    }

    fn spawn_router(mode: CaptureMode, ocr: bool) -> Harness {
        let (capture_tx, capture_rx) = bounded(256);
        let (encoder_tx, encoder_rx) = bounded(256);
        let (detector_tx, detector_rx) = bounded(256);
        let (preview_tx, preview_rx) = bounded(256);
        let (ocr_tx, ocr_rx) = bounded(256);
        let control = Arc::new(ControlState::new(mode));
        let cancel = CancellationToken::new();

        tokio::spawn(run(
            capture_rx,
            RouterQueues {
                encoder: encoder_tx,
                detector: detector_tx,
                preview: preview_tx,
                ocr: ocr.then_some(ocr_tx),
            },
            Arc::clone(&control),
            Arc::new(PipelineStats::new()),
            cancel.clone(),
        ));

        Harness {
            capture_tx,
            encoder_rx,
            detector_rx,
            preview_rx,
            ocr_rx: ocr.then_some(ocr_rx),
            control,
            cancel,
        }
    }

    #[tokio::test]
    async fn focus_frames_reach_the_encoder_only() {
        let mut h = spawn_router(CaptureMode::Focus, false);
        h.capture_tx.push(frame(1));
        h.capture_tx.push(frame(2));

        assert_eq!(h.encoder_rx.recv().await.unwrap().data[0], 1);
        assert_eq!(h.encoder_rx.recv().await.unwrap().data[0], 2);
        assert!(h.detector_rx.try_recv().is_none());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn mode_change_redirects_the_stream() {
        let mut h = spawn_router(CaptureMode::Focus, false);
        h.capture_tx.push(frame(1));
        assert_eq!(h.encoder_rx.recv().await.unwrap().data[0], 1);

        h.control.set_mode(CaptureMode::Context);
        h.capture_tx.push(frame(2));
        assert_eq!(h.detector_rx.recv().await.unwrap().data[0], 2);
        assert!(h.encoder_rx.try_recv().is_none());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn preview_always_sees_the_stream_and_ocr_only_when_enabled() {
        let mut h = spawn_router(CaptureMode::Focus, true);
        h.capture_tx.push(frame(3));
        assert_eq!(h.preview_rx.recv().await.unwrap().data[0], 3);
        assert_eq!(h.ocr_rx.as_mut().unwrap().recv().await.unwrap().data[0], 3);
        h.cancel.cancel();

        let mut h = spawn_router(CaptureMode::Focus, false);
        h.capture_tx.push(frame(4));
        assert_eq!(h.preview_rx.recv().await.unwrap().data[0], 4);
        assert!(h.ocr_rx.is_none());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn router_survives_a_dropped_stage_queue() {
        let mut h = spawn_router(CaptureMode::Focus, false);
        // Encoder stopped consuming (failed-encoder case).
        drop(h.encoder_rx);
        h.capture_tx.push(frame(5));
        // The stream still reaches the preview stage.
        assert_eq!(h.preview_rx.recv().await.unwrap().data[0], 5);
        h.cancel.cancel();
    }
}
