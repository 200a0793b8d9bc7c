//! HTTP client for the relay service

use anonchat_core::{Ack, MessageRequest, RelayApi, TypingRequest};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

/// [`RelayApi`] over HTTP
#[derive(Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelay {
    /// `base_url` is the relay root, e.g. `http://127.0.0.1:4000`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Ack> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        let ack = response.json::<Ack>().await?;
        debug!(url = %url, success = ack.success, "Relay acknowledged");
        Ok(ack)
    }
}

fn submission_failure(err: crate::error::Error) -> anonchat_core::Error {
    anonchat_core::Error::SubmissionFailure(err.to_string())
}

#[async_trait]
impl RelayApi for HttpRelay {
    async fn submit_message(&self, sender: &str, text: &str) -> anonchat_core::Result<Ack> {
        self.post("/messages", &MessageRequest::new(sender, text))
            .await
            .map_err(submission_failure)
    }

    async fn submit_typing(&self, sender: &str) -> anonchat_core::Result<Ack> {
        self.post("/typing", &TypingRequest::new(sender))
            .await
            .map_err(submission_failure)
    }
}
