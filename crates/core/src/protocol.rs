//! Relay protocol types
//!
//! HTTP request/response bodies for the relay and the event payloads it
//! republishes on the broadcast channel.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::TypingSignal;

/// Default broadcast channel shared by every client
pub const DEFAULT_CHANNEL: &str = "chatroom";

/// Named event published on the broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "new_message")]
    NewMessage,
    #[serde(rename = "user_typing")]
    UserTyping,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::UserTyping => "user_typing",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new_message" => Ok(EventKind::NewMessage),
            "user_typing" => Ok(EventKind::UserTyping),
            other => Err(Error::InvalidRequest(format!("unknown event: {}", other))),
        }
    }
}

/// Payload of both `new_message` and `user_typing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub sender: String,
    pub text: String,
}

impl ChatEvent {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// The `user_typing` payload for `sender`
    pub fn typing(sender: impl Into<String>) -> Self {
        let sender = sender.into();
        let text = TypingSignal::label_for(&sender);
        Self { sender, text }
    }
}

/// Body of `POST /messages`. Fields are optional so a missing one can be
/// reported as an invalid request rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageRequest {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
            text: Some(text.into()),
        }
    }

    /// Validate and turn into the `new_message` payload
    pub fn into_event(self) -> Result<ChatEvent> {
        let sender = required("sender", self.sender)?;
        let text = required("text", self.text)?;
        Ok(ChatEvent { sender, text })
    }
}

/// Body of `POST /typing`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl TypingRequest {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
        }
    }

    /// Validate and turn into the `user_typing` payload
    pub fn into_event(self) -> Result<ChatEvent> {
        let sender = required("sender", self.sender)?;
        Ok(ChatEvent::typing(sender))
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::InvalidRequest(format!("missing field `{}`", field))),
    }
}

/// Relay acknowledgement: `{"success": 200}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: u16,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: 200 }
    }
}

/// Error body: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
