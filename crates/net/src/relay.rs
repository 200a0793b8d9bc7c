//! HTTP relay service
//!
//! Write-only front door: `POST /messages` and `POST /typing` are reshaped
//! into `new_message` / `user_typing` events and published on the broadcast
//! channel. The relay holds no history and never retries a publish.

use std::sync::Arc;
use std::time::Duration;

use anonchat_core::{
    Ack, BroadcastChannel, ChatEvent, ErrorBody, EventKind, MessageRequest, TypingRequest,
};
use axum::extract::{Form, FromRequest, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Relay errors, one per HTTP failure class
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    PublishFailure(String),

    #[error("Not Found")]
    NotFound,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::PublishFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<anonchat_core::Error> for RelayError {
    fn from(err: anonchat_core::Error) -> Self {
        match err {
            anonchat_core::Error::InvalidRequest(msg) => RelayError::InvalidRequest(msg),
            other => RelayError::PublishFailure(other.to_string()),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// Body extractor accepting JSON or a url-encoded form, chosen by
/// `Content-Type`. Anything else is parsed as JSON.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send + 'static,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
            Ok(JsonOrForm(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| RelayError::InvalidRequest(e.body_text()))?;
            Ok(JsonOrForm(value))
        }
    }
}

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    broadcast: Arc<dyn BroadcastChannel>,
    channel: String,
    simulated_latency: Duration,
}

impl RelayState {
    pub fn new(broadcast: Arc<dyn BroadcastChannel>, channel: impl Into<String>) -> Self {
        Self {
            broadcast,
            channel: channel.into(),
            simulated_latency: Duration::ZERO,
        }
    }

    /// Delay every message publish by `latency`
    pub fn with_simulated_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, kind: EventKind, event: &ChatEvent) -> Result<(), RelayError> {
        self.broadcast
            .publish(&self.channel, kind, event)
            .await
            .map_err(|e| {
                warn!(channel = %self.channel, event = %kind, error = %e, "Publish failed");
                RelayError::PublishFailure(e.to_string())
            })
    }
}

/// Build the relay router
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/messages", post(submit_message).fallback(not_found))
        .route("/typing", post(submit_typing).fallback(not_found))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay on an already bound listener until the server stops
pub async fn serve(listener: TcpListener, state: RelayState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, channel = %state.channel(), "Relay listening");
    axum::serve(listener, router(state)).await
}

/// POST /messages
async fn submit_message(
    State(state): State<RelayState>,
    JsonOrForm(req): JsonOrForm<MessageRequest>,
) -> Result<Json<Ack>, RelayError> {
    let event = req.into_event()?;

    if !state.simulated_latency.is_zero() {
        debug!(latency = ?state.simulated_latency, "Simulating latency");
        tokio::time::sleep(state.simulated_latency).await;
    }

    state.publish(EventKind::NewMessage, &event).await?;
    info!(sender = %event.sender, "Relayed message");
    Ok(Json(Ack::ok()))
}

/// POST /typing
async fn submit_typing(
    State(state): State<RelayState>,
    JsonOrForm(req): JsonOrForm<TypingRequest>,
) -> Result<Json<Ack>, RelayError> {
    let event = req.into_event()?;
    state.publish(EventKind::UserTyping, &event).await?;
    debug!(sender = %event.sender, "Relayed typing");
    Ok(Json(Ack::ok()))
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}
