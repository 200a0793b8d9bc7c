//! Ephemeral typing signal

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How long a typing label stays up before the periodic reset clears it
pub const TYPING_EXPIRY: Duration = Duration::from_secs(2);

/// A remote user is typing. Never stored in message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub sender_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl TypingSignal {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }

    /// Label broadcast for a typing sender, e.g. `alice is typing...`
    pub fn label_for(sender_id: &str) -> String {
        format!("{} is typing...", sender_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        assert_eq!(TypingSignal::label_for("alice"), "alice is typing...");
    }
}
