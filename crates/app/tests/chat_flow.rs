//! Two sessions talking through a real relay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anonchat_app::{ChatSession, SessionUpdate, DEFAULT_TITLE};
use anonchat_core::{BroadcastChannel, InMemoryChannel, MessageStatus};
use anonchat_net::{HttpRelay, Hub, HubChannel, RelayState};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

async fn spawn_relay(channel: Arc<dyn BroadcastChannel>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(anonchat_net::serve(listener, RelayState::new(channel, "chatroom")));
    format!("http://{}", addr)
}

async fn wait_for_messages(
    session: &ChatSession,
    updates: &mut broadcast::Receiver<SessionUpdate>,
    count: usize,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.messages().len() < count {
            let _ = updates.recv().await;
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for messages");
}

fn summary(session: &ChatSession) -> Vec<(String, String, MessageStatus)> {
    session
        .messages()
        .into_iter()
        .map(|m| (m.sender_id.clone(), m.text.clone(), m.status()))
        .collect()
}

/// alice sends, bob sees it, bob replies; alice never sees her own echo
async fn converse(broadcast: &dyn BroadcastChannel, relay_url: &str) {
    let alice = ChatSession::with_default_reset(Arc::new(HttpRelay::new(relay_url)));
    let bob = ChatSession::with_default_reset(Arc::new(HttpRelay::new(relay_url)));
    let mut alice_updates = alice.subscribe_updates();
    let mut bob_updates = bob.subscribe_updates();

    alice.start("alice", broadcast, "chatroom").await.unwrap();
    bob.start("bob", broadcast, "chatroom").await.unwrap();

    assert_eq!(alice.compose_and_send("hi").await.unwrap(), Some(0));
    assert_eq!(
        summary(&alice),
        vec![("alice".into(), "hi".into(), MessageStatus::Delivered)]
    );

    wait_for_messages(&bob, &mut bob_updates, 1).await;
    assert_eq!(
        summary(&bob),
        vec![("alice".into(), "hi".into(), MessageStatus::Delivered)]
    );

    bob.compose_and_send("hey").await.unwrap();
    wait_for_messages(&alice, &mut alice_updates, 2).await;
    assert_eq!(
        summary(&alice),
        vec![
            ("alice".into(), "hi".into(), MessageStatus::Delivered),
            ("bob".into(), "hey".into(), MessageStatus::Delivered),
        ]
    );
    assert_eq!(summary(&bob).len(), 2);
}

#[tokio::test]
async fn test_conversation_over_in_memory_channel() {
    let channel = Arc::new(InMemoryChannel::new());
    let url = spawn_relay(channel.clone()).await;

    converse(channel.as_ref(), &url).await;
    assert_eq!(channel.published().len(), 2);
}

#[tokio::test]
async fn test_conversation_over_hub() {
    let hub = Hub::start(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let relay_side = Arc::new(HubChannel::connect(hub.addr()).await.unwrap());
    let client_side = HubChannel::connect(hub.addr()).await.unwrap();
    let url = spawn_relay(relay_side).await;

    converse(&client_side, &url).await;
    hub.shutdown();
}

#[tokio::test]
async fn test_typing_reaches_other_session() {
    let channel = Arc::new(InMemoryChannel::new());
    let url = spawn_relay(channel.clone()).await;

    let alice = ChatSession::with_default_reset(Arc::new(HttpRelay::new(url.as_str())));
    let bob = ChatSession::with_default_reset(Arc::new(HttpRelay::new(url.as_str())));
    let mut bob_updates = bob.subscribe_updates();
    alice.start("alice", channel.as_ref(), "chatroom").await.unwrap();
    bob.start("bob", channel.as_ref(), "chatroom").await.unwrap();

    assert!(alice.notify_typing().await);

    let update = tokio::time::timeout(Duration::from_secs(5), bob_updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update, SessionUpdate::TitleChanged("alice is typing...".into()));
    assert_eq!(bob.title(), "alice is typing...");
    assert_eq!(alice.title(), DEFAULT_TITLE);
}

#[tokio::test]
async fn test_unreachable_relay_marks_failed() {
    let channel = InMemoryChannel::new();
    let session = ChatSession::with_default_reset(Arc::new(HttpRelay::new("http://127.0.0.1:1")));
    session.start("alice", &channel, "chatroom").await.unwrap();

    assert!(session.compose_and_send("hi").await.is_err());
    assert_eq!(session.messages()[0].status(), MessageStatus::Failed);
}
