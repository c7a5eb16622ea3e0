//! Delivery shim between the network and a processor mailbox.
//!
//! The network hands over raw little-endian PCM16 payloads. The shim decodes
//! them into [`InboundFrame`]s off the render thread and forwards them to a
//! [`MessagePort`]; the host applies them between ticks.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{BridgeEvent, EventCallback, InboundFrame, MessagePort};

/// Decodes payloads from `payload_rx` and forwards them to `port`.
///
/// Runs until `payload_rx` closes or the port's processor goes away.
/// Payloads with an odd byte count are reported as
/// [`BridgeEvent::MalformedMessage`] and skipped.
pub async fn run_delivery(
    mut payload_rx: mpsc::Receiver<Bytes>,
    port: MessagePort,
    event_callback: Option<EventCallback>,
) {
    let mut forwarded: u64 = 0;

    while let Some(payload) = payload_rx.recv().await {
        let frame = match InboundFrame::from_le_bytes(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(processor = %port.id(), error = %e, "Dropping malformed payload");
                if let Some(ref callback) = event_callback {
                    callback(BridgeEvent::MalformedMessage {
                        reason: e.to_string(),
                    });
                }
                continue;
            }
        };

        if port.send(frame).await.is_err() {
            tracing::debug!(processor = %port.id(), "Processor gone, stopping delivery");
            break;
        }
        forwarded += 1;
    }

    tracing::debug!(processor = %port.id(), forwarded, "Delivery finished");
}

/// Spawns [`run_delivery`] on the current tokio runtime.
pub fn spawn_delivery(
    payload_rx: mpsc::Receiver<Bytes>,
    port: MessagePort,
    event_callback: Option<EventCallback>,
) -> JoinHandle<()> {
    tokio::spawn(run_delivery(payload_rx, port, event_callback))
}
