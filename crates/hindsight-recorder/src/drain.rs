//! Side-stage consumers: preview forwarding and the OCR hook.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hindsight_core::{PipelineEvent, QueueReceiver, RawFrame};

/// Forward preview frames onto the event stream. Consumers that cannot
/// keep up simply miss frames; the channel never blocks the router.
pub async fn preview(
    mut rx: QueueReceiver<RawFrame>,
    events: mpsc::Sender<PipelineEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(frame) = maybe else { break };
                let _ = events.try_send(PipelineEvent::PreviewFrame(frame));
            }
        }
    }
}

/// OCR side-stage. Recognition itself lives outside the core; this worker
/// owns the queue so an integration can replace it without touching the
/// router.
pub async fn ocr(mut rx: QueueReceiver<RawFrame>, cancel: CancellationToken) {
    let mut received: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(_frame) = maybe else { break };
                received += 1;
                if received % 100 == 0 {
                    debug!("ocr stage has received {received} frames");
                }
            }
        }
    }
}
