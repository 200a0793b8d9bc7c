//! Terminal rendering and input parsing

use anonchat_core::Message;

use crate::session::{ChatSession, SessionUpdate};

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Typing,
    Quit,
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "/quit" => Input::Quit,
            "/typing" => Input::Typing,
            _ => Input::Send(line.to_string()),
        }
    }
}

/// Render a message. Own messages carry their status label.
pub fn render_message(message: &Message, local_sender: Option<&str>) -> String {
    let line = format!(
        "[{}] {}: {}",
        message.format_timestamp(),
        message.sender_id,
        message.text
    );
    match local_sender {
        Some(local) if message.is_from(local) => {
            format!("{} ({})", line, message.status().label())
        }
        _ => line,
    }
}

pub fn render_title(title: &str) -> String {
    format!("== {} ==", title)
}

/// Line to print for an update, if any
pub fn render_update(session: &ChatSession, update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::MessageAppended(id) | SessionUpdate::StatusChanged { id, .. } => session
            .message(*id)
            .map(|m| render_message(&m, session.sender_id())),
        SessionUpdate::TitleChanged(title) => Some(render_title(title)),
    }
}
