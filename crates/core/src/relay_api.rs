//! Client-side view of the relay service

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Ack;

/// The two relay operations a chat session calls.
///
/// Implementations report any non-2xx answer or transport error as
/// [`crate::Error::SubmissionFailure`].
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// `POST /messages`
    async fn submit_message(&self, sender: &str, text: &str) -> Result<Ack>;

    /// `POST /typing`
    async fn submit_typing(&self, sender: &str) -> Result<Ack>;
}
