use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use reed_client::{BusConfig, ClientConfig, ConnectionError, ConnectionManager};
use reed_protocol::{OutgoingMessage, SocketEvent};

mod rest;

use rest::RosterClient;

#[derive(Parser)]
#[command(name = "reed")]
#[command(about = "Terminal front-end for the reed chat client")]
#[command(version)]
struct Cli {
    /// Chat server base URL for the REST endpoints
    #[arg(long, default_value = "http://localhost:3000")]
    server_url: String,

    /// WebSocket base URL; derived from --server-url when omitted
    #[arg(long)]
    ws_url: Option<String>,

    /// Auth token obtained from the login endpoint
    #[arg(long, env = "REED_TOKEN")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and chat interactively
    Chat {
        /// Replay buffered events to late subscribers
        #[arg(long, default_value = "false")]
        replay: bool,
    },
    /// Print conversations and uncontacted users, then exit
    Roster,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ws_url = cli
        .ws_url
        .clone()
        .unwrap_or_else(|| derive_ws_url(&cli.server_url));

    match cli.command {
        Commands::Roster => print_roster(&cli.server_url, &cli.token).await,
        Commands::Chat { replay } => chat(&cli.server_url, &ws_url, &cli.token, replay).await,
    }
}

async fn print_roster(server_url: &str, token: &str) -> anyhow::Result<()> {
    let roster = RosterClient::new(server_url, token);

    let conversations = roster
        .my_conversations()
        .await
        .context("loading conversations")?;
    println!("Conversations:");
    if conversations.is_empty() {
        println!("  (none)");
    }
    for conv in &conversations {
        let name = conv.name.clone().unwrap_or_else(|| {
            conv.participants
                .iter()
                .map(|u| u.username.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        });
        println!("  #{} {}", conv.id, name);
    }

    let users = roster
        .uncontacted_users()
        .await
        .context("loading uncontacted users")?;
    println!("Uncontacted users:");
    if users.is_empty() {
        println!("  (none)");
    }
    for user in &users {
        println!("  {} (id {})", user.username, user.id);
    }
    Ok(())
}

async fn chat(server_url: &str, ws_url: &str, token: &str, replay: bool) -> anyhow::Result<()> {
    // Seed the view from REST before the socket opens; a bad token fails
    // here with a readable error instead of a silent dead channel.
    print_roster(server_url, token).await?;

    let manager = ConnectionManager::new(ClientConfig {
        base_url: ws_url.to_string(),
        bus: BusConfig {
            replay,
            ..BusConfig::default()
        },
    });

    let mut status = manager.watch_status();
    let mut events = manager.subscribe();
    manager.connect(token).await?;

    println!("Type a message and press enter. Prefix with '@<conversation-id> ' to scope it.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("[status] {}", *status.borrow_and_update());
            }
            event = events.recv() => match event {
                Some(SocketEvent::ChatMessage(msg)) => {
                    println!("[#{}] {}: {}", msg.conversation_id, msg.author.username, msg.content);
                }
                Some(SocketEvent::Presence(user)) => {
                    println!("* {} connected", user.username);
                }
                None => break,
            },
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match manager.send(parse_input(line)) {
                        Ok(()) => debug!("message queued"),
                        Err(ConnectionError::NotConnected) => {
                            eprintln!("not connected; message dropped");
                        }
                        Err(err) => eprintln!("send failed: {err}"),
                    }
                }
                None => break,
            },
        }
    }

    manager.disconnect().await;
    println!("[status] {}", manager.status());
    Ok(())
}

/// `@12 hello` scopes the message to conversation 12; anything else is an
/// unscoped message.
fn parse_input(line: &str) -> OutgoingMessage {
    if let Some(rest) = line.strip_prefix('@') {
        if let Some((id, content)) = rest.split_once(' ') {
            if let Ok(id) = id.parse::<i64>() {
                return OutgoingMessage::in_conversation(id, content.trim());
            }
        }
    }
    OutgoingMessage::text(line)
}

fn derive_ws_url(server_url: &str) -> String {
    if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        server_url.to_string()
    }
}
