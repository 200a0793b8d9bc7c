//! Message model for the chat room

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-session sequence number, assigned in append order
pub type MessageId = u64;

/// Delivery state of a message as seen by the local session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    /// Whether a message in this state may move to `next`.
    ///
    /// Status only moves forward; `Delivered` and `Failed` are terminal.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Sending, Sent) | (Sending, Failed) | (Sending, Delivered) | (Sent, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }

    /// Label shown under an outgoing message
    pub fn label(self) -> &'static str {
        match self {
            MessageStatus::Sending => "Sending...",
            MessageStatus::Sent => "Sent!",
            MessageStatus::Delivered => "Delivered",
            MessageStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A chat message in the local session's list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    status: MessageStatus,
}

impl Message {
    /// A message authored locally, waiting for the relay
    pub fn outgoing(id: MessageId, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_status(id, sender_id, text, MessageStatus::Sending)
    }

    /// A message received from the broadcast channel
    pub fn incoming(id: MessageId, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::with_status(id, sender_id, text, MessageStatus::Delivered)
    }

    fn with_status(
        id: MessageId,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            sender_id: sender_id.into(),
            text: text.into(),
            created_at: Utc::now(),
            status,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    /// Move the message to `next`, rejecting backward or out-of-terminal moves
    pub fn advance(&mut self, next: MessageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_from(&self, sender_id: &str) -> bool {
        self.sender_id == sender_id
    }

    pub fn format_timestamp(&self) -> String {
        self.created_at.format("%H:%M").to_string()
    }
}
