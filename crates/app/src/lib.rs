//! AnonChat client session and terminal front end

pub mod commands;
pub mod error;
pub mod session;
pub mod typing;
pub mod view;

pub use error::{AppError, AppResult};
pub use session::{ChatSession, SessionUpdate};
pub use typing::{TypingIndicator, DEFAULT_TITLE};
