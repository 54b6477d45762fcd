//! WebSocket transport for the live link.
//!
//! A [`Connector`] opens the raw sink/stream pair; [`WsClient`] owns the
//! read, write and heartbeat pumps running over it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use fleetops_protocol::constants::{MAX_FRAME_SIZE, TOKEN_QUERY_PARAM};

use crate::dispatcher::DeliveryHandle;

/// Errors from the live link. All of them end in the failure path; none is
/// surfaced to the host as a return value.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no auth token available")]
    AuthMissing,

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("link idle for {0:?}, assuming it is dead")]
    IdleTimeout(Duration),

    #[error("server closed the connection")]
    ServerClosed,

    #[error("connection closed")]
    Closed,
}

/// Outbound half of an open transport.
pub type BoxSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;

/// Inbound half of an open transport.
pub type BoxStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// An opened, not yet pumped, transport.
pub struct Transport {
    pub sink: BoxSink,
    pub stream: BoxStream,
}

/// Opens transports. Injected into the manager so tests can script the
/// network.
pub trait Connector: Send + Sync {
    fn open<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Transport, LinkError>> + Send + 'a>>;
}

/// Real connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Transport, LinkError>> + Send + 'a>> {
        Box::pin(async move {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(MAX_FRAME_SIZE);
            ws_config.max_frame_size = Some(MAX_FRAME_SIZE);
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
            let (write, read) = ws_stream.split();
            Ok(Transport {
                sink: Box::pin(write),
                stream: Box::pin(read),
            })
        })
    }
}

/// Builds the connection URI with the sanitized token as a query parameter.
pub fn build_connect_url(endpoint: &str, token: &str) -> Result<url::Url, LinkError> {
    let mut url = url::Url::parse(endpoint)?;
    url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
    Ok(url)
}

/// Callbacks from the pumps back into the owning manager.
#[derive(Clone)]
pub(crate) struct PumpHooks {
    pub(crate) delivery: DeliveryHandle,
    on_alive: Arc<dyn Fn() + Send + Sync>,
    on_failure: Arc<dyn Fn(LinkError) + Send + Sync>,
    failed: Arc<AtomicBool>,
}

impl PumpHooks {
    pub(crate) fn new(
        delivery: DeliveryHandle,
        on_alive: Arc<dyn Fn() + Send + Sync>,
        on_failure: Arc<dyn Fn(LinkError) + Send + Sync>,
    ) -> Self {
        Self {
            delivery,
            on_alive,
            on_failure,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A well-formed frame arrived.
    pub(crate) fn alive(&self) {
        (self.on_alive)();
    }

    /// Reports a transport failure. Only the first report per client counts.
    pub(crate) fn fail(&self, err: LinkError) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            (self.on_failure)(err);
        }
    }
}

/// Timings the pumps run with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PumpTimings {
    pub(crate) heartbeat_period: Duration,
    pub(crate) idle_timeout: Duration,
}

/// A live transport with its pumps.
///
/// Closing (or dropping) the client cancels all three pumps; pumps that
/// stop because of cancellation never report a failure.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Spawns the pumps over an opened transport.
    pub(crate) fn start(transport: Transport, timings: PumpTimings, hooks: PumpHooks) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let cancel = CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            let hooks = hooks.clone();
            tokio::spawn(crate::pumps::write::write_pump(
                transport.sink,
                write_rx,
                hooks,
                cancel,
            ))
        };

        let read_handle = {
            let cancel = cancel.clone();
            let hooks = hooks.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                transport.stream,
                hooks,
                write_tx,
                timings.idle_timeout,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                timings.heartbeat_period,
                hooks,
                cancel,
            ))
        };

        Self {
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        }
    }

    /// Returns a sender feeding the write pump.
    pub(crate) fn writer(&self) -> mpsc::Sender<tungstenite::Message> {
        self.write_tx.clone()
    }

    /// Stops the pumps. The write pump sends a close frame on its way out.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        // The write pump is left to finish its close frame.
        self._read_handle.abort();
        self._ping_handle.abort();
    }
}
