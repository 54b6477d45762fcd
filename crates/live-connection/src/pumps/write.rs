//! WebSocket write pump: forwards outbound frames to the socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::ws_client::{LinkError, PumpHooks};

/// Writes queued frames to the WebSocket.
///
/// A write error is reported as a link failure. On cancellation a close
/// frame is sent on a best-effort basis.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    hooks: PumpHooks,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            if !cancel.is_cancelled() {
                                hooks.fail(LinkError::Ws(e));
                            }
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
