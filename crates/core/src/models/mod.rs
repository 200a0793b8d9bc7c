//! Data models for AnonChat

mod message;
mod typing;
mod username;

pub use message::*;
pub use typing::*;
pub use username::*;
