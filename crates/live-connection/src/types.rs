//! Public types for the live connection manager.

use std::time::Duration;

use fleetops_protocol::constants::{
    CONNECT_TIMEOUT, HEARTBEAT_PERIOD, RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS,
};
use fleetops_protocol::types::{ActiveShift, UserLocation};

/// Connection state of the live link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. Either never connected, failed, or explicitly closed.
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open and heartbeat running.
    Connected,
}

/// Events published by the connection manager for the host to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// Full replacement of the online users list.
    Presence(Vec<UserLocation>),
    /// Full replacement of the active shifts list.
    Shifts(Vec<ActiveShift>),
    /// A reconnection attempt has been scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// The retry budget is exhausted. No further automatic attempts.
    GaveUp { attempts: u32 },
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Attempts allowed after a failure before giving up.
    pub max_attempts: u32,
    /// Delay before the first attempt. Doubles for each subsequent one.
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: RECONNECT_MAX_ATTEMPTS,
            base_delay: RECONNECT_BASE_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Settings for one live link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket endpoint, e.g. `wss://api.example.com/ws/locations`.
    pub endpoint: String,
    /// Upper bound on opening the transport.
    pub connect_timeout: Duration,
    /// Interval between application `ping` frames.
    pub heartbeat_period: Duration,
    /// Silence after which the link is considered dead.
    pub idle_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl LinkConfig {
    /// Creates a config for `endpoint` with the default timings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: CONNECT_TIMEOUT,
            heartbeat_period: HEARTBEAT_PERIOD,
            idle_timeout: HEARTBEAT_PERIOD * 3,
            reconnect: ReconnectConfig::default(),
        }
    }
}
