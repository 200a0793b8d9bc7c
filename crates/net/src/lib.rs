//! AnonChat Network Library
//!
//! HTTP relay service, its client, and a TCP broadcast hub.
//!
//! # Architecture
//!
//! - **Relay**: axum service turning `POST /messages` and `POST /typing`
//!   into broadcast publishes
//! - **HttpRelay**: reqwest client implementing [`anonchat_core::RelayApi`]
//! - **Hub**: TCP server fanning events out to channel subscribers
//! - **HubChannel**: hub client implementing [`anonchat_core::BroadcastChannel`]
//! - **Protocol**: length-prefixed JSON frames between hub and peers
//!
//! # Usage
//!
//! ```ignore
//! let hub = Hub::start(config.hub.addr).await?;
//! let channel = Arc::new(HubChannel::connect(hub.addr()).await?);
//!
//! let listener = TcpListener::bind(config.relay.listen_addr).await?;
//! relay::serve(listener, RelayState::new(channel, "chatroom")).await?;
//! ```

pub mod channel;
pub mod error;
mod frame;
pub mod hub;
pub mod protocol;
pub mod relay;
pub mod relay_client;

pub use channel::HubChannel;
pub use error::{Error, Result};
pub use hub::Hub;
pub use protocol::HubFrame;
pub use relay::{router, serve, RelayError, RelayState};
pub use relay_client::HttpRelay;
