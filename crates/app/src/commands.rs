//! Subcommand entry points

use std::sync::Arc;

use anonchat_core::{suggest_username, validate_username, Config};
use anonchat_net::{HttpRelay, Hub, HubChannel, RelayState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::session::ChatSession;
use crate::view::{self, Input};

/// Run the broadcast hub until Ctrl-C
pub async fn run_hub(config: &Config) -> AppResult<()> {
    let hub = Hub::start(config.hub.addr).await?;
    tokio::signal::ctrl_c().await?;
    hub.shutdown();
    Ok(())
}

/// Run the relay, optionally with the hub in the same process
pub async fn run_relay(config: &Config, embed_hub: bool) -> AppResult<()> {
    let hub = if embed_hub {
        Some(Hub::start(config.hub.addr).await?)
    } else {
        None
    };
    let hub_addr = hub.as_ref().map(Hub::addr).unwrap_or(config.hub.addr);

    let channel = Arc::new(HubChannel::connect(hub_addr).await?);
    let state = RelayState::new(channel.clone(), config.relay.channel.clone())
        .with_simulated_latency(config.relay.simulated_latency());
    let listener = TcpListener::bind(config.relay.listen_addr).await?;

    tokio::select! {
        result = anonchat_net::serve(listener, state) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Relay shutting down");
        }
    }

    channel.disconnect().await;
    if let Some(hub) = hub {
        hub.shutdown();
    }
    Ok(())
}

/// Pick the chat identity: the given name if valid, else a suggestion
pub fn choose_username(name: Option<&str>) -> AppResult<String> {
    match name {
        Some(name) => {
            validate_username(name)?;
            Ok(name.to_string())
        }
        None => {
            let name = suggest_username();
            info!(name = %name, "No name given, using suggestion");
            Ok(name)
        }
    }
}

/// Interactive terminal chat
pub async fn run_chat(config: &Config, name: Option<&str>) -> AppResult<()> {
    let name = choose_username(name)?;

    let channel = HubChannel::connect(config.hub.addr).await?;
    let relay = Arc::new(HttpRelay::new(config.client.relay_url.clone()));
    let session = ChatSession::new(relay, config.client.typing_reset_interval());

    let mut updates = session.subscribe_updates();
    session.start(&name, &channel, &config.relay.channel).await?;

    println!("{}", view::render_title(&session.title()));
    println!("Joined as {}. /typing to notify, /quit to leave.", name);

    let render_session = session.clone();
    let renderer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Some(line) = view::render_update(&render_session, &update) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Renderer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if handle_input(&session, Input::parse(&line)).is_none() {
            break;
        }
    }

    renderer.abort();
    channel.disconnect().await;
    info!("Left the chat");
    Ok(())
}

/// Act on one input line. Every typed line counts as input activity, so a
/// message also raises a typing notification. Returns the spawned
/// submissions, or `None` on `/quit`.
pub fn handle_input(session: &ChatSession, input: Input) -> Option<Vec<JoinHandle<()>>> {
    let notify = |session: &ChatSession| {
        let session = session.clone();
        tokio::spawn(async move {
            session.notify_typing().await;
        })
    };

    match input {
        Input::Quit => None,
        Input::Empty => Some(Vec::new()),
        Input::Typing => Some(vec![notify(session)]),
        Input::Send(text) => {
            let typing = notify(session);
            // Failures are logged by the session and shown as `Failed`
            let session = session.clone();
            let send = tokio::spawn(async move {
                let _ = session.compose_and_send(&text).await;
            });
            Some(vec![typing, send])
        }
    }
}
