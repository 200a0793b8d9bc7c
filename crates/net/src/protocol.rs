//! Hub protocol frames
//!
//! All frames are JSON-serialized and length-prefixed on the wire. The hub
//! treats event names and payloads as opaque; typed decoding happens in
//! [`crate::channel::HubChannel`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames exchanged between the hub and its peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubFrame {
    /// Peer wants every event published on `channel`
    Subscribe { channel: String },

    /// Hub confirms a subscription
    Subscribed { channel: String },

    /// Peer no longer wants events from `channel`
    Unsubscribe { channel: String },

    /// Peer publishes an event
    Publish {
        channel: String,
        event: String,
        payload: Value,
    },

    /// Hub confirms a publish and how many peers it was fanned out to
    Published {
        channel: String,
        event: String,
        receivers: usize,
    },

    /// Event delivered to a subscriber
    Event {
        channel: String,
        event: String,
        payload: Value,
    },

    /// Hub refused the previous request
    Error { reason: String },

    /// Ping to check the connection
    Ping,

    /// Pong response to ping
    Pong,
}

impl HubFrame {
    /// Serialize frame to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize frame from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
