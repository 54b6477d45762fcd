//! Frame codec for the live link.
//!
//! Inbound frames are parsed leniently: a frame must be a JSON object with a
//! string `type`, but list payloads are decoded element by element so one
//! bad record never discards the whole batch.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::constants::{FrameType, MAX_FRAME_SIZE};
use crate::types::{ActiveShift, Coordinates, UserLocation};

/// Errors for a single inbound frame. Never fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed frame: top level is not an object")]
    NotAnObject,

    #[error("malformed frame: missing string `type` field")]
    MissingType,

    #[error("frame too large ({0} bytes)")]
    TooLarge(usize),
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PresenceUpdate(Vec<UserLocation>),
    ShiftUpdate(Vec<ActiveShift>),
    Heartbeat,
    Unknown(String),
}

/// Position report sent by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    #[serde(flatten)]
    pub coordinates: Coordinates,
    pub timestamp: DateTime<Utc>,
}

/// A frame sent by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "location")]
    LocationReport { data: LocationReport },
    #[serde(rename = "ping")]
    HeartbeatPing,
}

impl OutboundMessage {
    /// Builds a location report.
    pub fn location(coordinates: Coordinates, timestamp: DateTime<Utc>) -> Self {
        Self::LocationReport {
            data: LocationReport {
                coordinates,
                timestamp,
            },
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::LocationReport { .. } => FrameType::Location,
            Self::HeartbeatPing => FrameType::Ping,
        }
    }

    /// Serializes the message into a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decodes one inbound text frame.
pub fn decode_frame(text: &str) -> Result<InboundEvent, FrameError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(text.len()));
    }

    let value: serde_json::Value = serde_json::from_str(text)?;
    let serde_json::Value::Object(mut obj) = value else {
        return Err(FrameError::NotAnObject);
    };
    let tag = obj
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    let event = match FrameType::from_tag(&tag) {
        Some(FrameType::OnlineUsers) => {
            let users = decode_records::<UserLocation>(obj.remove("users"), "users");
            InboundEvent::PresenceUpdate(
                users.into_iter().filter(|u| keep_valid(u.is_valid(), "users")).collect(),
            )
        }
        Some(FrameType::ActiveShifts) => {
            let shifts = decode_records::<ActiveShift>(obj.remove("shifts"), "shifts");
            InboundEvent::ShiftUpdate(
                shifts.into_iter().filter(|s| keep_valid(s.is_valid(), "shifts")).collect(),
            )
        }
        Some(FrameType::Pong) => InboundEvent::Heartbeat,
        // Outbound-only tags arriving from the server are not meaningful.
        Some(FrameType::Ping | FrameType::Location) | None => InboundEvent::Unknown(tag),
    };

    trace!(frame_type = %tag_of(&event), "decoded frame");
    Ok(event)
}

/// Decodes a JSON array field record by record, skipping failures.
fn decode_records<T: DeserializeOwned>(field: Option<serde_json::Value>, name: &str) -> Vec<T> {
    let items = match field {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => {
            warn!(field = name, "list field missing, treating as empty");
            return Vec::new();
        }
        Some(_) => {
            warn!(field = name, "list field is not an array, treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(field = name, index, error = %e, "skipping unparseable record");
                None
            }
        })
        .collect()
}

fn keep_valid(valid: bool, name: &str) -> bool {
    if !valid {
        warn!(field = name, "skipping record with invalid location");
    }
    valid
}

fn tag_of(event: &InboundEvent) -> &str {
    match event {
        InboundEvent::PresenceUpdate(_) => FrameType::OnlineUsers.as_str(),
        InboundEvent::ShiftUpdate(_) => FrameType::ActiveShifts.as_str(),
        InboundEvent::Heartbeat => FrameType::Pong.as_str(),
        InboundEvent::Unknown(tag) => tag,
    }
}
