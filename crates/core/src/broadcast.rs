//! Broadcast channel capability
//!
//! The relay publishes chat events to a named channel and every client
//! session subscribes to it. Delivery is at-least-once and unordered, and
//! every subscriber (the publisher included) receives every event. Publishing
//! never waits on a subscriber: one whose queue is full misses the event.
//!
//! [`InMemoryChannel`] implements the capability in-process; the network
//! hub client lives in `anonchat-net`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{ChatEvent, EventKind};

/// Queue depth for each subscription
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// One event received on a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub kind: EventKind,
    pub payload: ChatEvent,
}

/// Receiving end of a channel subscription
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    /// Create a subscription and the sender that feeds it
    pub fn open(channel: impl Into<String>) -> (mpsc::Sender<Delivery>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (
            tx,
            Self {
                channel: channel.into(),
                rx,
            },
        )
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next event; `None` once the channel is gone
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Named publish/subscribe transport
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Publish `payload` as event `kind` on `channel`
    async fn publish(&self, channel: &str, kind: EventKind, payload: &ChatEvent) -> Result<()>;

    /// Subscribe to every event published on `channel`
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Record of a publish made through [`InMemoryChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub channel: String,
    pub kind: EventKind,
    pub payload: ChatEvent,
}

#[derive(Default)]
struct InMemoryState {
    subscribers: HashMap<String, Vec<mpsc::Sender<Delivery>>>,
    published: Vec<PublishedEvent>,
    fail_publishes: bool,
}

/// In-process broadcast channel
#[derive(Default)]
pub struct InMemoryChannel {
    state: Mutex<InMemoryState>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful publish so far, in call order
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.lock().published.clone()
    }

    /// Make subsequent publishes fail with [`Error::PublishFailure`]
    pub fn set_fail_publishes(&self, fail: bool) {
        self.lock().fail_publishes = fail;
    }

    /// Live subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .subscribers
            .get(channel)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BroadcastChannel for InMemoryChannel {
    async fn publish(&self, channel: &str, kind: EventKind, payload: &ChatEvent) -> Result<()> {
        let targets = {
            let mut state = self.lock();
            if state.fail_publishes {
                return Err(Error::PublishFailure(format!(
                    "channel {} rejected {}",
                    channel, kind
                )));
            }
            state.published.push(PublishedEvent {
                channel: channel.to_string(),
                kind,
                payload: payload.clone(),
            });
            match state.subscribers.get_mut(channel) {
                Some(subs) => {
                    subs.retain(|tx| !tx.is_closed());
                    subs.clone()
                }
                None => Vec::new(),
            }
        };

        debug!(channel, event = %kind, receivers = targets.len(), "Publishing");
        let delivery = Delivery {
            kind,
            payload: payload.clone(),
        };
        for tx in targets {
            match tx.try_send(delivery.clone()) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(channel, event = %kind, "Subscriber queue full, event dropped");
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, subscription) = Subscription::open(channel);
        self.lock()
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        debug!(channel, "Subscribed");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let channel = InMemoryChannel::new();
        let mut a = channel.subscribe("chatroom").await.unwrap();
        let mut b = channel.subscribe("chatroom").await.unwrap();
        let mut other = channel.subscribe("elsewhere").await.unwrap();

        let payload = ChatEvent::new("alice", "hi");
        channel
            .publish("chatroom", EventKind::NewMessage, &payload)
            .await
            .unwrap();

        for sub in [&mut a, &mut b] {
            let delivery = sub.next().await.unwrap();
            assert_eq!(delivery.kind, EventKind::NewMessage);
            assert_eq!(delivery.payload, payload);
        }
        assert!(other.try_next().is_none());
        assert_eq!(channel.published().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_publish_records_nothing() {
        let channel = InMemoryChannel::new();
        let mut sub = channel.subscribe("chatroom").await.unwrap();
        channel.set_fail_publishes(true);

        let result = channel
            .publish("chatroom", EventKind::UserTyping, &ChatEvent::typing("bob"))
            .await;

        assert!(matches!(result, Err(Error::PublishFailure(_))));
        assert!(channel.published().is_empty());
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let channel = InMemoryChannel::new();
        let sub = channel.subscribe("chatroom").await.unwrap();
        assert_eq!(channel.subscriber_count("chatroom"), 1);
        drop(sub);
        assert_eq!(channel.subscriber_count("chatroom"), 0);

        channel
            .publish("chatroom", EventKind::NewMessage, &ChatEvent::new("a", "b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_block_publish() {
        let channel = InMemoryChannel::new();
        let mut stalled = channel.subscribe("chatroom").await.unwrap();
        let mut healthy = channel.subscribe("chatroom").await.unwrap();

        for i in 0..SUBSCRIPTION_BUFFER + 10 {
            let payload = ChatEvent::new("alice", format!("msg {}", i));
            tokio::time::timeout(
                std::time::Duration::from_secs(5),
                channel.publish("chatroom", EventKind::NewMessage, &payload),
            )
            .await
            .expect("publish blocked on a full subscriber")
            .unwrap();
            assert_eq!(healthy.try_next().unwrap().payload, payload);
        }

        let mut queued = 0;
        while stalled.try_next().is_some() {
            queued += 1;
        }
        assert_eq!(queued, SUBSCRIPTION_BUFFER);
        assert_eq!(channel.published().len(), SUBSCRIPTION_BUFFER + 10);
    }
}
