//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Rejected by hub: {0}")]
    Rejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Hub full")]
    HubFull,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<Error> for anonchat_core::Error {
    fn from(err: Error) -> Self {
        anonchat_core::Error::PublishFailure(err.to_string())
    }
}
