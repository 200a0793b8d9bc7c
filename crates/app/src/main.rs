//! AnonChat - anonymous real-time chat
//!
//! One binary for the three roles: broadcast hub, HTTP relay and terminal
//! chat client.

use std::path::PathBuf;

use anonchat_app::commands;
use anonchat_app::AppResult;
use anonchat_core::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anonchat", version, about = "Anonymous real-time chat")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the broadcast hub
    Hub,
    /// Run the HTTP relay
    Relay {
        /// Connect to an external hub instead of starting one
        #[arg(long)]
        no_hub: bool,
    },
    /// Join the chat room from this terminal
    Chat {
        /// Username; a random one is picked when omitted
        #[arg(short, long)]
        name: Option<String>,
    },
}

fn main() {
    // Logs go to stderr so they do not interleave with chat output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Hub => commands::run_hub(&config).await,
        Command::Relay { no_hub } => {
            commands::run_relay(&config, config.relay.embed_hub && !no_hub).await
        }
        Command::Chat { name } => commands::run_chat(&config, name.as_deref()).await,
    }
}
