//! AnonChat Core Library
//!
//! Message model, relay protocol, broadcast capability and configuration
//! shared by the relay service and chat clients.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod relay_api;

pub use broadcast::{BroadcastChannel, Delivery, InMemoryChannel, PublishedEvent, Subscription};
pub use config::Config;
pub use error::{Error, Result};
pub use models::*;
pub use protocol::{
    Ack, ChatEvent, ErrorBody, EventKind, MessageRequest, TypingRequest, DEFAULT_CHANNEL,
};
pub use relay_api::RelayApi;
