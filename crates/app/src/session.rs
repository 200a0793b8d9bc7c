//! Chat client session
//!
//! Owns the local identity, the ordered message list and the typing title.
//! Outgoing messages are appended as `sending` before the relay answers and
//! are later resolved by id, so submissions may complete in any order.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use anonchat_core::{
    BroadcastChannel, ChatEvent, Delivery, Error, EventKind, Message, MessageId, MessageStatus,
    RelayApi, Result, TypingSignal, TYPING_EXPIRY,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::typing::{InFlightGuard, TypingIndicator};

/// Update stream depth
const UPDATE_BUFFER: usize = 256;

/// Change notifications for the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    MessageAppended(MessageId),
    StatusChanged { id: MessageId, status: MessageStatus },
    TitleChanged(String),
}

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    next_id: MessageId,
}

struct SessionInner {
    sender_id: OnceLock<String>,
    relay: Arc<dyn RelayApi>,
    state: Mutex<SessionState>,
    typing_in_flight: AtomicBool,
    typing: TypingIndicator,
    typing_reset: Duration,
    updates: broadcast::Sender<SessionUpdate>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// A chat participant. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// New session submitting through `relay`; the typing title resets
    /// every `typing_reset`
    pub fn new(relay: Arc<dyn RelayApi>, typing_reset: Duration) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let typing = TypingIndicator::new(updates.clone());
        Self {
            inner: Arc::new(SessionInner {
                sender_id: OnceLock::new(),
                relay,
                state: Mutex::new(SessionState::default()),
                typing_in_flight: AtomicBool::new(false),
                typing,
                typing_reset,
                updates,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_default_reset(relay: Arc<dyn RelayApi>) -> Self {
        Self::new(relay, TYPING_EXPIRY)
    }

    /// Set the local identity and start listening on `channel`
    pub async fn start(
        &self,
        sender_id: &str,
        broadcast: &dyn BroadcastChannel,
        channel: &str,
    ) -> Result<()> {
        if sender_id.is_empty() {
            return Err(Error::InvalidRequest("sender id must not be empty".into()));
        }
        if let Some(existing) = self.inner.sender_id.get() {
            return self.check_identity(existing, sender_id);
        }

        let subscription = broadcast.subscribe(channel).await?;

        if self.inner.sender_id.set(sender_id.to_string()).is_err() {
            // Lost a race with a concurrent start; its subscription stands
            if let Some(existing) = self.inner.sender_id.get() {
                return self.check_identity(existing, sender_id);
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(listen(weak, subscription));
        let timer = self.inner.typing.spawn_reset_timer(self.inner.typing_reset);
        self.lock_tasks().extend([listener, timer]);

        info!(sender = %sender_id, channel = %channel, "Session started");
        Ok(())
    }

    fn check_identity(&self, existing: &str, requested: &str) -> Result<()> {
        if existing == requested {
            debug!(sender = %existing, "Session already started");
            Ok(())
        } else {
            Err(Error::AlreadyStarted(existing.to_string()))
        }
    }

    /// Append a local message and submit it. `Ok(None)` for blank text.
    pub async fn compose_and_send(&self, text: &str) -> Result<Option<MessageId>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let sender = self.sender_id().ok_or(Error::NotStarted)?;

        let id = self.append_with(|id| Message::outgoing(id, sender, text));

        match self.inner.relay.submit_message(sender, text).await {
            Ok(_) => {
                self.set_status(id, MessageStatus::Delivered)?;
                debug!(id, "Message delivered");
                Ok(Some(id))
            }
            Err(e) => {
                warn!(id, error = %e, "Message submission failed");
                self.set_status(id, MessageStatus::Failed)?;
                Err(match e {
                    Error::SubmissionFailure(_) => e,
                    other => Error::SubmissionFailure(other.to_string()),
                })
            }
        }
    }

    /// Append a broadcast message unless it is our own echo
    pub fn on_remote_message(&self, event: &ChatEvent) -> bool {
        if self.is_self(&event.sender) {
            debug!("Dropping own message echo");
            return false;
        }
        self.append_with(|id| Message::incoming(id, &event.sender, &event.text));
        true
    }

    /// Tell the room we are typing. At most one submission is in flight;
    /// returns `true` when a request was issued.
    pub async fn notify_typing(&self) -> bool {
        let Some(sender) = self.sender_id() else {
            debug!("Typing before start ignored");
            return false;
        };
        let Some(_guard) = InFlightGuard::acquire(&self.inner.typing_in_flight) else {
            debug!("Typing notification already in flight");
            return false;
        };

        if let Err(e) = self.inner.relay.submit_typing(sender).await {
            warn!(error = %e, "Typing notification failed");
        }
        true
    }

    /// Show a remote typing label. Returns whether the title changed.
    pub fn on_remote_typing(&self, event: &ChatEvent) -> bool {
        if self.is_self(&event.sender) {
            return false;
        }
        self.inner
            .typing
            .show(TypingSignal::new(&event.sender, &event.text));
        true
    }

    /// Snapshot of the message list, in append order
    pub fn messages(&self) -> Vec<Message> {
        self.lock_state().messages.clone()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock_state()
            .messages
            .iter()
            .find(|m| m.id() == id)
            .cloned()
    }

    pub fn title(&self) -> String {
        self.inner.typing.title()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.inner.sender_id.get().map(String::as_str)
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.inner.updates.subscribe()
    }

    fn dispatch(&self, delivery: Delivery) {
        match delivery.kind {
            EventKind::NewMessage => {
                self.on_remote_message(&delivery.payload);
            }
            EventKind::UserTyping => {
                self.on_remote_typing(&delivery.payload);
            }
        }
    }

    fn is_self(&self, sender: &str) -> bool {
        self.sender_id() == Some(sender)
    }

    fn append_with(&self, build: impl FnOnce(MessageId) -> Message) -> MessageId {
        let id = {
            let mut state = self.lock_state();
            let id = state.next_id;
            state.next_id += 1;
            state.messages.push(build(id));
            id
        };
        let _ = self.inner.updates.send(SessionUpdate::MessageAppended(id));
        id
    }

    fn set_status(&self, id: MessageId, status: MessageStatus) -> Result<()> {
        {
            let mut state = self.lock_state();
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.id() == id)
                .ok_or_else(|| Error::InvalidRequest(format!("no message with id {}", id)))?;
            message.advance(status)?;
        }
        let _ = self
            .inner
            .updates
            .send(SessionUpdate::StatusChanged { id, status });
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Listener task - feeds broadcast deliveries into the session
async fn listen(session: Weak<SessionInner>, mut subscription: anonchat_core::Subscription) {
    while let Some(delivery) = subscription.next().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        ChatSession { inner }.dispatch(delivery);
    }
    debug!(channel = %subscription.channel(), "Subscription ended");
}
