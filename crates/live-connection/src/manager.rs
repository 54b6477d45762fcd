//! Connection manager owning the lifecycle of the live link.
//!
//! Connects with the stored auth token, keeps the link alive with a
//! heartbeat, and reconnects automatically with exponential backoff after
//! unexpected failures. An explicit [`ConnectionManager::disconnect`]
//! suppresses all automatic transitions until the next
//! [`ConnectionManager::connect`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};

use fleetops_protocol::frames::OutboundMessage;

use crate::credentials::{AUTH_TOKEN_KEY, CredentialStore, sanitize_token};
use crate::dispatcher::DeliveryHandle;
use crate::reconnection::{LinkContext, LinkState, handle_failure};
use crate::types::{ConnectionState, LinkConfig, LinkEvent};
use crate::ws_client::{
    Connector, LinkError, PumpHooks, PumpTimings, WsClient, WsConnector, build_connect_url,
};

/// What started a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// A caller asked to connect. Starts a fresh retry budget.
    Fresh,
    /// The reconnect timer fired. Keeps the current attempt count.
    Retry,
}

/// Manages the single live link to the backend.
pub struct ConnectionManager {
    ctx: LinkContext,
}

impl ConnectionManager {
    /// Creates a manager using the real WebSocket connector.
    pub fn new(
        config: LinkConfig,
        credentials: Arc<dyn CredentialStore>,
        delivery: DeliveryHandle,
    ) -> Self {
        Self::with_connector(config, credentials, Arc::new(WsConnector), delivery)
    }

    /// Creates a manager with an injected transport factory.
    pub fn with_connector(
        config: LinkConfig,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn Connector>,
        delivery: DeliveryHandle,
    ) -> Self {
        Self {
            ctx: LinkContext {
                config: Arc::new(config),
                credentials,
                connector,
                delivery,
                link: Arc::new(Mutex::new(LinkState::new())),
            },
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.ctx.lock().state
    }

    /// Returns how many reconnect attempts the current failure streak used.
    pub fn attempt_count(&self) -> u32 {
        self.ctx.lock().attempt_count
    }

    /// Returns `true` after [`disconnect`](Self::disconnect) until the next
    /// [`connect`](Self::connect).
    pub fn is_explicitly_closed(&self) -> bool {
        self.ctx.lock().explicitly_closed
    }

    pub fn config(&self) -> &LinkConfig {
        &self.ctx.config
    }

    /// Connects the live link.
    ///
    /// No-op if already connecting or connected. Otherwise resets the retry
    /// budget and performs one attempt; a failed attempt schedules retries
    /// in the background. Never returns an error: outcomes are observable
    /// through [`state`](Self::state) and the delivered [`LinkEvent`]s.
    pub async fn connect(&self) {
        establish(self.ctx.clone(), Attempt::Fresh).await;
    }

    /// Sends a frame on the live link.
    ///
    /// Dropped with a warning if not connected. A write failure enters the
    /// failure path.
    pub async fn send(&self, message: OutboundMessage) {
        let (generation, writer) = {
            let link = self.ctx.lock();
            if link.state != ConnectionState::Connected {
                warn!(frame_type = ?message.frame_type(), state = ?link.state, "not connected, dropping outbound frame");
                return;
            }
            (link.generation, link.client.as_ref().map(WsClient::writer))
        };
        let Some(writer) = writer else {
            return;
        };

        let json = match message.encode() {
            Ok(json) => json,
            Err(e) => {
                warn!(frame_type = ?message.frame_type(), "failed to encode outbound frame: {e}");
                return;
            }
        };

        if writer
            .send(tungstenite::Message::Text(json.into()))
            .await
            .is_err()
        {
            handle_failure(&self.ctx, generation, LinkError::Closed);
        }
    }

    /// Tears the link down and suppresses automatic reconnection.
    ///
    /// Safe to call repeatedly and from any state.
    pub fn disconnect(&self) {
        let (client, previous) = {
            let mut link = self.ctx.lock();
            link.explicitly_closed = true;
            link.cancel_reconnect();
            let client = link.client.take();
            let previous = std::mem::replace(&mut link.state, ConnectionState::Disconnected);
            (client, previous)
        };

        if let Some(client) = client {
            client.close();
        }
        if previous != ConnectionState::Disconnected {
            self.ctx
                .delivery
                .deliver(LinkEvent::StateChanged(ConnectionState::Disconnected));
            info!(?previous, "live link disconnected");
        } else {
            debug!("disconnect on idle link");
        }
    }

    /// Final teardown.
    pub fn shutdown(&self) {
        self.disconnect();
        info!("connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // Timers hold their own context clones; stop them reviving the link.
        self.disconnect();
    }
}

/// Performs one connection attempt.
///
/// Returns a boxed future to break the recursive type cycle with
/// [`handle_failure`], whose reconnect timer awaits this function.
pub(crate) fn establish(
    ctx: LinkContext,
    attempt: Attempt,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let Some(generation) = ctx.begin_attempt(attempt) else {
            return;
        };

        match ctx.open_client(generation).await {
            Ok(client) => ctx.finish_connect(generation, client),
            Err(e) => handle_failure(&ctx, generation, e),
        }
    })
}

impl LinkContext {
    /// Moves the link to `Connecting` if an attempt is allowed.
    ///
    /// Returns the new generation, or `None` when the attempt is skipped.
    fn begin_attempt(&self, attempt: Attempt) -> Option<u64> {
        let (generation, stale) = {
            let mut link = self.lock();
            if matches!(
                link.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(state = ?link.state, ?attempt, "link already active, connect ignored");
                return None;
            }
            match attempt {
                Attempt::Fresh => {
                    link.attempt_count = 0;
                    link.explicitly_closed = false;
                }
                Attempt::Retry if link.explicitly_closed => {
                    debug!("explicitly closed, skipping scheduled reconnect");
                    return None;
                }
                Attempt::Retry => {}
            }
            link.cancel_reconnect();
            link.generation += 1;
            link.state = ConnectionState::Connecting;
            (link.generation, link.client.take())
        };

        if let Some(stale) = stale {
            stale.close();
        }
        self.delivery
            .deliver(LinkEvent::StateChanged(ConnectionState::Connecting));
        Some(generation)
    }

    /// Reads the token, opens the transport and starts the pumps.
    async fn open_client(&self, generation: u64) -> Result<WsClient, LinkError> {
        let token = self
            .credentials
            .read(AUTH_TOKEN_KEY)
            .as_deref()
            .and_then(sanitize_token)
            .ok_or(LinkError::AuthMissing)?;
        let url = build_connect_url(&self.config.endpoint, &token)?;

        info!(endpoint = %self.config.endpoint, generation, "connecting live link");

        let transport =
            tokio::time::timeout(self.config.connect_timeout, self.connector.open(url.as_str()))
                .await
                .map_err(|_| LinkError::ConnectTimeout)??;

        let timings = PumpTimings {
            heartbeat_period: self.config.heartbeat_period,
            idle_timeout: self.config.idle_timeout,
        };
        Ok(WsClient::start(transport, timings, self.pump_hooks(generation)))
    }

    /// Commits a freshly opened client, unless the attempt was overtaken by
    /// a disconnect, a newer attempt, or an early pump failure.
    fn finish_connect(&self, generation: u64, client: WsClient) {
        {
            let mut link = self.lock();
            if link.generation != generation
                || link.state != ConnectionState::Connecting
                || link.explicitly_closed
            {
                drop(link);
                debug!(generation, "attempt overtaken, discarding transport");
                client.close();
                return;
            }
            link.state = ConnectionState::Connected;
            link.client = Some(client);
        }

        self.delivery
            .deliver(LinkEvent::StateChanged(ConnectionState::Connected));
        info!(generation, "live link connected");
    }

    /// Hooks for the pumps of transport `generation`.
    fn pump_hooks(&self, generation: u64) -> PumpHooks {
        let on_alive = {
            let ctx = self.clone();
            Arc::new(move || {
                let mut link = ctx.lock();
                if link.generation == generation && link.attempt_count != 0 {
                    debug!(previous = link.attempt_count, "link alive, retry budget restored");
                    link.attempt_count = 0;
                }
            })
        };
        let on_failure = {
            let ctx = self.clone();
            Arc::new(move |e: LinkError| handle_failure(&ctx, generation, e))
        };
        PumpHooks::new(self.delivery.clone(), on_alive, on_failure)
    }
}
