//! operator-chat - conversation console for storefront operators
//!
//! Keeps one customer conversation in sync over REST and a live event
//! stream, from the terminal.

mod api;
mod config;
mod console;
mod engine;
mod error;
mod live;
mod models;
mod tui;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::models::ConversationId;

#[derive(Parser)]
#[command(name = "operator-chat")]
#[command(about = "Operator console for storefront customer conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store backend URL, token and operator identity
    Configure {
        /// Backend root, e.g. https://shop.example.com
        #[arg(long)]
        base_url: Option<String>,

        /// Live event endpoint (default: derived from the backend URL)
        #[arg(long)]
        live_url: Option<String>,

        /// Bearer token for the console API
        #[arg(long)]
        token: Option<String>,

        /// Operator id messages are sent as
        #[arg(long)]
        operator: Option<String>,

        /// Re-fetch history after the live stream reconnects
        #[arg(long)]
        resync_on_reconnect: Option<bool>,
    },

    /// Show the current configuration
    Status,

    /// Print the history of a conversation
    History {
        /// Conversation id
        conversation: String,

        /// Print normalized records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a message
    Send {
        /// Conversation id
        #[arg(short, long)]
        to: String,

        /// Image file to attach
        #[arg(short, long)]
        attach: Option<PathBuf>,

        /// Message content
        message: Option<String>,
    },

    /// Edit one of your messages
    Edit {
        /// Conversation the message belongs to
        #[arg(long = "in")]
        conversation: String,

        /// Message id
        id: String,

        /// New content
        message: Option<String>,

        /// Replacement image
        #[arg(short, long)]
        attach: Option<PathBuf>,
    },

    /// Delete one of your messages
    Delete {
        /// Conversation the message belongs to
        #[arg(long = "in")]
        conversation: String,

        /// Message id
        id: String,
    },

    /// Follow a conversation and print new messages
    Watch {
        /// Conversation id
        conversation: String,
    },

    /// Launch the terminal user interface
    Tui {
        /// Conversation id
        conversation: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Commands::Tui { .. } = cli.command {
        // The TUI owns the terminal; log to a file instead.
        let path = config::Config::log_path()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    match cli.command {
        Commands::Configure {
            base_url,
            live_url,
            token,
            operator,
            resync_on_reconnect,
        } => {
            console::configure(console::ConfigureArgs {
                base_url,
                live_url,
                token,
                operator,
                resync_on_reconnect,
            })?;
        }
        Commands::Status => {
            console::status()?;
        }
        Commands::History { conversation, json } => {
            console::history(&conversation, json).await?;
        }
        Commands::Send { to, attach, message } => {
            tracing::info!("Sending message...");
            console::send(&to, message, attach).await?;
        }
        Commands::Edit {
            conversation,
            id,
            message,
            attach,
        } => {
            console::edit(&conversation, &id, message, attach).await?;
        }
        Commands::Delete { conversation, id } => {
            console::delete(&conversation, &id).await?;
        }
        Commands::Watch { conversation } => {
            console::watch(&conversation).await?;
        }
        Commands::Tui { conversation } => {
            let config = config::Config::load()?;
            tui::run(&config, ConversationId::new(conversation)).await?;
        }
    }

    Ok(())
}
