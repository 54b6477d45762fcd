//! WebSocket read pump: decodes and routes incoming frames.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fleetops_protocol::frames::{InboundEvent, decode_frame};

use crate::types::LinkEvent;
use crate::ws_client::{LinkError, PumpHooks};

/// Reads frames from the WebSocket until cancelled or the link fails.
///
/// Any incoming message resets an idle deadline; if nothing arrives within
/// `idle_timeout` the link is considered dead and a failure is reported.
pub(crate) async fn read_pump<S>(
    mut read: S,
    hooks: PumpHooks,
    write_tx: mpsc::Sender<tungstenite::Message>,
    idle_timeout: Duration,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let idle_deadline = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle_deadline);

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = &mut idle_deadline => {
                warn!(?idle_timeout, "no traffic on live link, closing");
                break LinkError::IdleTimeout(idle_timeout);
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        idle_deadline.as_mut().reset(tokio::time::Instant::now() + idle_timeout);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_frame(&text, &hooks);
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received transport ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break LinkError::ServerClosed;
                            }
                            _ => {} // Binary and transport pongs carry nothing for us.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break LinkError::Ws(e);
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break LinkError::Closed;
                    }
                }
            }
        }
    };

    if !cancel.is_cancelled() {
        hooks.fail(failure);
    }
}

/// Decodes one text frame and routes it.
///
/// Malformed frames are logged and dropped; they never end the pump.
fn handle_text_frame(text: &str, hooks: &PumpHooks) {
    let event = match decode_frame(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "dropping inbound frame");
            return;
        }
    };

    hooks.alive();

    match event {
        InboundEvent::PresenceUpdate(users) => {
            trace!(count = users.len(), "presence update");
            hooks.delivery.deliver(LinkEvent::Presence(users));
        }
        InboundEvent::ShiftUpdate(shifts) => {
            trace!(count = shifts.len(), "shift update");
            hooks.delivery.deliver(LinkEvent::Shifts(shifts));
        }
        InboundEvent::Heartbeat => trace!("received pong"),
        InboundEvent::Unknown(tag) => debug!(frame_type = %tag, "unrecognized frame type, ignoring"),
    }
}
