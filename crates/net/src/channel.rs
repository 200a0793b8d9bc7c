//! Hub client implementing [`BroadcastChannel`]
//!
//! One TCP connection carries all publishes and subscriptions of a process.
//! Publishes wait for the hub's `Published` ack and subscriptions for its
//! `Subscribed` ack; the hub answers each peer in request order, so pending
//! requests sit in one queue and every answer, an `Error` included, resolves
//! the oldest one.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use anonchat_core::{BroadcastChannel, ChatEvent, Delivery, EventKind, Subscription};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::HubFrame;

/// Inbound frame queue depth
const FRAME_QUEUE: usize = 256;

enum Command {
    Publish {
        channel: String,
        event: String,
        payload: Value,
        reply: oneshot::Sender<Result<usize>>,
    },
    Subscribe {
        channel: String,
        tx: mpsc::Sender<Delivery>,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect,
}

/// Broadcast channel backed by a [`crate::Hub`]
pub struct HubChannel {
    addr: SocketAddr,
    cmd_tx: mpsc::Sender<Command>,
}

impl HubChannel {
    /// Connect to a hub
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to hub");

        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = tokio::io::split(stream);

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(reader_task(reader, frame_tx));
        tokio::spawn(connection_task(writer, frame_rx, cmd_rx));

        Ok(HubChannel { addr, cmd_tx })
    }

    /// Address of the hub this channel talks to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close the connection; open subscriptions end
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }

    async fn request<T>(&self, cmd: Command, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

#[async_trait]
impl BroadcastChannel for HubChannel {
    async fn publish(
        &self,
        channel: &str,
        kind: EventKind,
        payload: &ChatEvent,
    ) -> anonchat_core::Result<()> {
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Publish {
            channel: channel.to_string(),
            event: kind.as_str().to_string(),
            payload: serde_json::to_value(payload)?,
            reply,
        };
        let receivers = self.request(cmd, rx).await?;
        debug!(channel, event = %kind, receivers, "Published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> anonchat_core::Result<Subscription> {
        let (tx, subscription) = Subscription::open(channel);
        let (reply, rx) = oneshot::channel();
        let cmd = Command::Subscribe {
            channel: channel.to_string(),
            tx,
            reply,
        };
        self.request(cmd, rx)
            .await
            .map_err(|e| anonchat_core::Error::SubscriptionFailure(e.to_string()))?;
        Ok(subscription)
    }
}

/// Reader task - forwards frames from the hub
async fn reader_task(mut reader: ReadHalf<TcpStream>, frame_tx: mpsc::Sender<HubFrame>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(frame) => {
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!("Hub closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }
}

/// A request waiting for the hub's answer
enum Pending {
    Publish(oneshot::Sender<Result<usize>>),
    Subscribe(oneshot::Sender<Result<()>>),
}

impl Pending {
    fn fail(self, err: Error) {
        match self {
            Pending::Publish(reply) => {
                let _ = reply.send(Err(err));
            }
            Pending::Subscribe(reply) => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Connection-side bookkeeping
#[derive(Default)]
struct ConnectionState {
    pending: VecDeque<Pending>,
    subscribers: HashMap<String, Vec<mpsc::Sender<Delivery>>>,
}

impl ConnectionState {
    /// Fail every outstanding request; the connection is gone
    fn fail_all(&mut self, reason: &str) {
        for pending in self.pending.drain(..) {
            pending.fail(Error::Rejected(reason.to_string()));
        }
    }
}

/// Main connection task
async fn connection_task(
    mut writer: WriteHalf<TcpStream>,
    mut frame_rx: mpsc::Receiver<HubFrame>,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let mut state = ConnectionState::default();

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Some(unsubscribe) = handle_hub_frame(frame, &mut state).await {
                            if let Err(e) = write_frame(&mut writer, &unsubscribe).await {
                                warn!(error = %e, "Write error");
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }

            cmd = cmd_rx.recv() => {
                let frame = match cmd {
                    Some(Command::Publish { channel, event, payload, reply }) => {
                        state.pending.push_back(Pending::Publish(reply));
                        HubFrame::Publish { channel, event, payload }
                    }
                    Some(Command::Subscribe { channel, tx, reply }) => {
                        let subs = state.subscribers.entry(channel.clone()).or_default();
                        let already_subscribed = !subs.is_empty();
                        subs.push(tx);
                        if already_subscribed {
                            let _ = reply.send(Ok(()));
                            continue;
                        }
                        state.pending.push_back(Pending::Subscribe(reply));
                        HubFrame::Subscribe { channel }
                    }
                    Some(Command::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!(error = %e, "Write error");
                    break;
                }
            }
        }
    }

    // Dropping the subscriber senders ends every open subscription
    state.fail_all("connection closed");
    info!("Disconnected from hub");
}

/// Apply a frame from the hub. Returns an `Unsubscribe` frame when the last
/// local subscription of a channel has gone away.
async fn handle_hub_frame(frame: HubFrame, state: &mut ConnectionState) -> Option<HubFrame> {
    match frame {
        HubFrame::Event {
            channel,
            event,
            payload,
        } => {
            let kind = match event.parse::<EventKind>() {
                Ok(kind) => kind,
                Err(_) => {
                    debug!(channel = %channel, event = %event, "Skipping unknown event");
                    return None;
                }
            };
            let payload: ChatEvent = match serde_json::from_value(payload) {
                Ok(p) => p,
                Err(e) => {
                    warn!(channel = %channel, event = %event, error = %e, "Malformed payload");
                    return None;
                }
            };

            let subs = state.subscribers.get_mut(&channel)?;
            let delivery = Delivery { kind, payload };
            let mut live = Vec::with_capacity(subs.len());
            for tx in subs.drain(..) {
                if tx.send(delivery.clone()).await.is_ok() {
                    live.push(tx);
                }
            }
            *subs = live;

            if subs.is_empty() {
                state.subscribers.remove(&channel);
                return Some(HubFrame::Unsubscribe { channel });
            }
            None
        }
        HubFrame::Published { receivers, .. } => {
            match state.pending.pop_front() {
                Some(Pending::Publish(reply)) => {
                    let _ = reply.send(Ok(receivers));
                }
                Some(other) => {
                    warn!("Publish ack out of order");
                    other.fail(Error::Protocol("unexpected publish ack".into()));
                }
                None => warn!("Publish ack with nothing pending"),
            }
            None
        }
        HubFrame::Subscribed { channel } => {
            match state.pending.pop_front() {
                Some(Pending::Subscribe(reply)) => {
                    let _ = reply.send(Ok(()));
                }
                Some(other) => {
                    warn!(channel = %channel, "Subscribe ack out of order");
                    other.fail(Error::Protocol("unexpected subscribe ack".into()));
                }
                None => warn!(channel = %channel, "Subscribe ack with nothing pending"),
            }
            None
        }
        HubFrame::Error { reason } => {
            warn!(reason = %reason, "Hub reported an error");
            if let Some(oldest) = state.pending.pop_front() {
                oldest.fail(Error::Rejected(reason));
            }
            None
        }
        HubFrame::Pong => {
            debug!("Received pong");
            None
        }
        _ => {
            debug!("Ignoring unexpected frame");
            None
        }
    }
}
