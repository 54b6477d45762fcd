//! Live connection to the fleet backend.
//!
//! Provides the WebSocket connection manager with heartbeat and automatic
//! reconnection, credential lookup, and the queue that hands inbound
//! updates to the host's main loop.

pub mod credentials;
pub mod dispatcher;
pub mod manager;
mod pumps;
pub mod reconnection;
pub mod types;
pub mod ws_client;

pub use credentials::{
    AUTH_TOKEN_KEY, CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use dispatcher::{DeliveryHandle, Dispatcher};
pub use manager::ConnectionManager;
pub use reconnection::{ReconnectPlan, next_plan};
pub use types::{ConnectionState, LinkConfig, LinkEvent, ReconnectConfig};
pub use ws_client::{Connector, LinkError, Transport, WsClient, WsConnector};
