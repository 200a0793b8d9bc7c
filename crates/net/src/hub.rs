//! TCP broadcast hub
//!
//! Peers connect, subscribe to named channels and publish events. Every
//! event published on a channel is fanned out to all peers subscribed to it,
//! the publisher included. The hub keeps no history, and a peer that falls
//! behind by more than its queue misses events rather than stalling the room.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::HubFrame;

/// Maximum number of connected peers
const MAX_PEERS: usize = 256;

/// Outbound queue depth per peer
const PEER_QUEUE: usize = 256;

/// Connected peer state
struct Peer {
    addr: SocketAddr,
    tx: mpsc::Sender<HubFrame>,
    channels: HashSet<String>,
}

/// Hub state shared across tasks
#[derive(Default)]
struct HubState {
    peers: HashMap<Uuid, Peer>,
}

impl HubState {
    fn subscribers(&self, channel: &str) -> Vec<(Uuid, mpsc::Sender<HubFrame>)> {
        self.peers
            .iter()
            .filter(|(_, p)| p.channels.contains(channel))
            .map(|(id, p)| (*id, p.tx.clone()))
            .collect()
    }
}

/// Hub handle
pub struct Hub {
    addr: SocketAddr,
    state: Arc<RwLock<HubState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Hub {
    /// Start a hub listening on `addr` (port 0 picks a free port)
    pub async fn start(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Hub started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(RwLock::new(HubState::default()));

        tokio::spawn(accept_loop(listener, state.clone(), shutdown_tx.clone()));

        Ok(Hub {
            addr: bound_addr,
            state,
            shutdown_tx,
        })
    }

    /// Get the hub's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.state.read().await.peers.len()
    }

    /// Number of peers subscribed to `channel`
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.state.read().await.subscribers(channel).len()
    }

    /// Stop accepting and drop every peer connection
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Hub shutdown initiated");
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<HubState>>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            state.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single peer connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<HubState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let (tx, rx) = mpsc::channel(PEER_QUEUE);
    let peer_id = match register_peer(&state, addr, tx).await {
        Ok(id) => id,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Peer refused");
            let _ = write_frame(
                &mut writer,
                &HubFrame::Error {
                    reason: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    info!(addr = %addr, peer_id = %peer_id, "Peer connected");

    let writer_handle = tokio::spawn(writer_task(writer, rx));

    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(frame) => handle_frame(frame, peer_id, &state).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(peer_id = %peer_id, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(peer_id = %peer_id, error = %e, "Read error");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(peer_id = %peer_id, "Closing peer on shutdown");
                break;
            }
        }
    }

    writer_handle.abort();
    state.write().await.peers.remove(&peer_id);

    info!(peer_id = %peer_id, "Peer disconnected");
}

async fn register_peer(
    state: &Arc<RwLock<HubState>>,
    addr: SocketAddr,
    tx: mpsc::Sender<HubFrame>,
) -> Result<Uuid> {
    let mut s = state.write().await;
    if s.peers.len() >= MAX_PEERS {
        return Err(Error::HubFull);
    }
    let peer_id = Uuid::new_v4();
    s.peers.insert(
        peer_id,
        Peer {
            addr,
            tx,
            channels: HashSet::new(),
        },
    );
    Ok(peer_id)
}

/// Writer task - sends frames to the peer
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<HubFrame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Queue a frame for one peer
async fn reply(state: &Arc<RwLock<HubState>>, peer_id: Uuid, frame: HubFrame) {
    let tx = state.read().await.peers.get(&peer_id).map(|p| p.tx.clone());
    if let Some(tx) = tx {
        if tx.send(frame).await.is_err() {
            debug!(peer_id = %peer_id, "Failed to queue frame for peer");
        }
    }
}

/// Handle an incoming frame
async fn handle_frame(frame: HubFrame, peer_id: Uuid, state: &Arc<RwLock<HubState>>) {
    match frame {
        HubFrame::Subscribe { channel } => {
            {
                let mut s = state.write().await;
                if let Some(peer) = s.peers.get_mut(&peer_id) {
                    peer.channels.insert(channel.clone());
                    debug!(peer_id = %peer_id, addr = %peer.addr, channel = %channel, "Subscribed");
                }
            }
            reply(state, peer_id, HubFrame::Subscribed { channel }).await;
        }
        HubFrame::Unsubscribe { channel } => {
            let mut s = state.write().await;
            if let Some(peer) = s.peers.get_mut(&peer_id) {
                peer.channels.remove(&channel);
            }
        }
        HubFrame::Publish {
            channel,
            event,
            payload,
        } => {
            let targets = state.read().await.subscribers(&channel);
            let delivery = HubFrame::Event {
                channel: channel.clone(),
                event: event.clone(),
                payload,
            };
            let mut receivers = 0;
            for (target, tx) in targets {
                // Never wait on a slow peer; it misses this event instead
                match tx.try_send(delivery.clone()) {
                    Ok(()) => receivers += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(peer_id = %target, channel = %channel, "Peer queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
            debug!(channel = %channel, event = %event, receivers, "Fanned out");

            reply(
                state,
                peer_id,
                HubFrame::Published {
                    channel,
                    event,
                    receivers,
                },
            )
            .await;
        }
        HubFrame::Ping => {
            reply(state, peer_id, HubFrame::Pong).await;
        }
        other => {
            debug!(peer_id = %peer_id, frame = ?other, "Ignoring unexpected frame");
            reply(
                state,
                peer_id,
                HubFrame::Error {
                    reason: "unexpected frame".into(),
                },
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::split;

    async fn raw_peer(addr: SocketAddr) -> TcpStream {
        TcpStream::connect(addr).await.unwrap()
    }

    #[tokio::test]
    async fn test_hub_start() {
        let hub = Hub::start(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        assert!(hub.addr().port() > 0);
        assert_eq!(hub.peer_count().await, 0);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_publish_reaches_publisher_and_subscribers() {
        let hub = Hub::start(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        let (mut a_read, mut a_write) = split(raw_peer(hub.addr()).await);
        let (mut b_read, mut b_write) = split(raw_peer(hub.addr()).await);

        for (reader, writer) in [(&mut a_read, &mut a_write), (&mut b_read, &mut b_write)] {
            write_frame(
                writer,
                &HubFrame::Subscribe {
                    channel: "chatroom".into(),
                },
            )
            .await
            .unwrap();
            assert!(matches!(
                read_frame(reader).await.unwrap(),
                HubFrame::Subscribed { .. }
            ));
        }

        let payload = serde_json::json!({ "sender": "alice", "text": "hi" });
        write_frame(
            &mut a_write,
            &HubFrame::Publish {
                channel: "chatroom".into(),
                event: "new_message".into(),
                payload: payload.clone(),
            },
        )
        .await
        .unwrap();

        // Publisher gets its own event, then the ack
        match read_frame(&mut a_read).await.unwrap() {
            HubFrame::Event { event, payload: p, .. } => {
                assert_eq!(event, "new_message");
                assert_eq!(p, payload);
            }
            other => panic!("expected Event, got {:?}", other),
        }
        match read_frame(&mut a_read).await.unwrap() {
            HubFrame::Published { receivers, .. } => assert_eq!(receivers, 2),
            other => panic!("expected Published, got {:?}", other),
        }

        match read_frame(&mut b_read).await.unwrap() {
            HubFrame::Event { payload: p, .. } => assert_eq!(p, payload),
            other => panic!("expected Event, got {:?}", other),
        }

        hub.shutdown();
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let hub = Hub::start(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let (mut reader, mut writer) = split(raw_peer(hub.addr()).await);

        write_frame(&mut writer, &HubFrame::Ping).await.unwrap();
        assert_eq!(read_frame(&mut reader).await.unwrap(), HubFrame::Pong);

        write_frame(&mut writer, &HubFrame::Pong).await.unwrap();
        assert!(matches!(
            read_frame(&mut reader).await.unwrap(),
            HubFrame::Error { .. }
        ));

        hub.shutdown();
    }

    #[tokio::test]
    async fn test_stalled_peer_does_not_block_publishers() {
        use crate::channel::HubChannel;
        use anonchat_core::{BroadcastChannel, ChatEvent, EventKind};
        use std::time::Duration;

        const PUBLISHES: usize = 600;

        let hub = Hub::start(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();

        // Subscribes, then never reads again
        let (mut stalled_read, mut stalled_write) = split(raw_peer(hub.addr()).await);
        write_frame(
            &mut stalled_write,
            &HubFrame::Subscribe {
                channel: "chatroom".into(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            read_frame(&mut stalled_read).await.unwrap(),
            HubFrame::Subscribed { .. }
        ));

        let listener_side = HubChannel::connect(hub.addr()).await.unwrap();
        let mut healthy = listener_side.subscribe("chatroom").await.unwrap();
        let drained = tokio::spawn(async move {
            let mut count = 0;
            while count < PUBLISHES {
                if healthy.next().await.is_none() {
                    break;
                }
                count += 1;
            }
            count
        });

        let relay_side = HubChannel::connect(hub.addr()).await.unwrap();
        let payload = ChatEvent::new("alice", "x".repeat(64 * 1024));
        for i in 0..PUBLISHES {
            tokio::time::timeout(
                Duration::from_secs(5),
                relay_side.publish("chatroom", EventKind::NewMessage, &payload),
            )
            .await
            .unwrap_or_else(|_| panic!("publish {} blocked behind a stalled peer", i))
            .unwrap();
        }

        let received = tokio::time::timeout(Duration::from_secs(10), drained)
            .await
            .expect("healthy subscriber fell behind")
            .unwrap();
        assert_eq!(received, PUBLISHES);

        drop(stalled_read);
        hub.shutdown();
    }
}
