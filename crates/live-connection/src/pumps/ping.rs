//! Heartbeat pump sending periodic application-level `ping` frames.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use fleetops_protocol::frames::OutboundMessage;

use crate::ws_client::{LinkError, PumpHooks};

/// Sends `{"type":"ping"}` every `period` until cancelled.
///
/// A failed send means the write side is gone and is reported as a link
/// failure.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    period: Duration,
    hooks: PumpHooks,
    cancel: CancellationToken,
) {
    let ping = match OutboundMessage::HeartbeatPing.encode() {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to encode heartbeat: {e}");
            return;
        }
    };

    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!("sending heartbeat ping");
                let frame = tungstenite::Message::Text(ping.clone().into());
                if write_tx.send(frame).await.is_err() {
                    if !cancel.is_cancelled() {
                        hooks.fail(LinkError::Closed);
                    }
                    break;
                }
            }
        }
    }
}
