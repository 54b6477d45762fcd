use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on establishing the WebSocket connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often an application-level `ping` frame is sent while connected.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// Delay before the first reconnection attempt. Doubles per attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(3);

/// Reconnection attempts allowed after a failure before giving up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Maximum inbound text frame size in bytes (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Query parameter carrying the auth token on the connection URI.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Discriminator values carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    // Server to device
    #[serde(rename = "online_users")]
    OnlineUsers,
    #[serde(rename = "active_shifts")]
    ActiveShifts,
    #[serde(rename = "pong")]
    Pong,

    // Device to server
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "ping")]
    Ping,
}

impl FrameType {
    /// Wire tag for this frame type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnlineUsers => "online_users",
            Self::ActiveShifts => "active_shifts",
            Self::Pong => "pong",
            Self::Location => "location",
            Self::Ping => "ping",
        }
    }

    /// Looks up a frame type by its wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "online_users" => Some(Self::OnlineUsers),
            "active_shifts" => Some(Self::ActiveShifts),
            "pong" => Some(Self::Pong),
            "location" => Some(Self::Location),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }
}
