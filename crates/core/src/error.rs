//! Error types for AnonChat Core

use thiserror::Error;

use crate::models::MessageStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailure(String),

    #[error("Submission failed: {0}")]
    SubmissionFailure(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Session not started")]
    NotStarted,

    #[error("Session already started as {0}")]
    AlreadyStarted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
