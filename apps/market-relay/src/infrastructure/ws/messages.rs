//! Downstream Wire Protocol
//!
//! JSON messages sent to WebSocket clients. Every message carries a
//! `type` tag and an ISO 8601 server timestamp; stream-scoped types embed
//! the stream name in the tag (`liquidations_snapshot`, `trades_update`).
//!
//! Clients never send application messages; the protocol is server-push
//! only, so there are no inbound message types to parse.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::event::{NormalizedEvent, StreamKind};

/// History snapshot sent once, immediately after a successful subscribe.
#[derive(Debug, Serialize)]
pub struct SnapshotMessage {
    /// `{stream}_snapshot` tag.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Display symbol.
    pub symbol: String,
    /// Retained events, oldest first.
    pub data: Vec<NormalizedEvent>,
    /// Server send time.
    pub timestamp: DateTime<Utc>,
}

impl SnapshotMessage {
    /// Build a snapshot message from the events retained for a stream.
    #[must_use]
    pub fn new(kind: StreamKind, symbol: impl Into<String>, events: &[Arc<NormalizedEvent>]) -> Self {
        Self {
            message_type: format!("{}_snapshot", kind.wire_name()),
            symbol: symbol.into(),
            data: events.iter().map(|event| (**event).clone()).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// One live event.
#[derive(Debug, Serialize)]
pub struct UpdateMessage {
    /// `{stream}_update` tag.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Display symbol.
    pub symbol: String,
    /// The event.
    pub data: NormalizedEvent,
    /// Server send time.
    pub timestamp: DateTime<Utc>,
}

impl UpdateMessage {
    /// Build an update message for one normalized event.
    #[must_use]
    pub fn new(kind: StreamKind, event: &NormalizedEvent) -> Self {
        Self {
            message_type: format!("{}_update", kind.wire_name()),
            symbol: event.symbol.clone(),
            data: event.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Sent on an idle session so clients can distinguish a quiet stream from
/// a dead connection.
#[derive(Debug, Serialize)]
pub struct HeartbeatMessage {
    /// Always `heartbeat`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Display symbol of the subscribed stream.
    pub symbol: String,
    /// Server send time.
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatMessage {
    /// Build a heartbeat for the subscribed symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            message_type: "heartbeat",
            symbol: symbol.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Terminal error sent before the server closes the session.
#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    /// Always `error`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Human-readable reason.
    pub message: String,
    /// Server send time.
    pub timestamp: DateTime<Utc>,
}

impl ErrorMessage {
    /// Build an error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message_type: "error",
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
