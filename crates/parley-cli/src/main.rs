//! # parley
//!
//! Terminal chat client. Loads settings, builds the store and a transport,
//! binds them with a `ChatClient`, and renders state changes to stdout.

#![deny(unsafe_code)]

mod render;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use parley_client::ChatClient;
use parley_core::ThreadId;
use parley_core::logging::init_subscriber;
use parley_settings::ClientSettings;
use parley_store::{ChatState, ChatStore};
use parley_transport::{SocketConfig, SocketTransport, SseConfig, SseTransport, Transport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::render::Renderer;

/// How often `watch` checks whether the socket supervisor has given up.
const LIVENESS_INTERVAL: Duration = Duration::from_millis(500);

/// Parley chat client.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Chat with a streaming agent from the terminal")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent base URL (overrides settings).
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Conversation thread (overrides settings).
    #[arg(long, global = true)]
    thread: Option<String>,

    /// Source reported for your messages (overrides settings).
    #[arg(long, global = true)]
    source: Option<String>,

    /// Disable ANSI colour.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message and stream the reply.
    Send {
        /// Message text.
        text: String,
        /// URL of an already-uploaded attachment (repeatable).
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Follow the thread over a socket; lines typed on stdin are sent.
    Watch,
}

impl Cli {
    fn settings(&self) -> Result<ClientSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(parley_settings::settings_path);
        let mut settings = parley_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(base_url) = &self.base_url {
            settings.server.base_url.clone_from(base_url);
        }
        if let Some(thread) = &self.thread {
            settings.chat.thread_id.clone_from(thread);
        }
        if let Some(source) = &self.source {
            settings.chat.source.clone_from(source);
        }
        Ok(settings)
    }

    fn color(&self) -> bool {
        !self.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);
    tracing::debug!(
        base_url = %settings.server.base_url,
        thread_id = %settings.chat.thread_id,
        "settings loaded"
    );

    let renderer = Renderer::new(cli.color());
    match cli.command {
        Command::Send { text, files } => run_send(&settings, renderer, &text, &files).await,
        Command::Watch => run_watch(&settings, renderer).await,
    }
}

fn bind_client(settings: &ClientSettings, store: &Arc<ChatStore>, transport: Arc<dyn Transport>) -> ChatClient {
    ChatClient::new(
        Arc::clone(store),
        transport,
        ThreadId::from(settings.chat.thread_id.as_str()),
        settings.chat.source.clone(),
    )
}

fn print_changes(renderer: &mut Renderer, rx: &mut watch::Receiver<ChatState>) {
    for line in renderer.render(&rx.borrow_and_update()) {
        println!("{line}");
    }
}

/// One request, one streamed reply.
async fn run_send(
    settings: &ClientSettings,
    mut renderer: Renderer,
    text: &str,
    files: &[String],
) -> Result<()> {
    let url = settings.stream_url().context("Invalid server settings")?;
    let config = SseConfig {
        connect_timeout: settings.transport.connect_timeout(),
        idle_timeout: settings.transport.idle_timeout(),
        ..SseConfig::new(url)
    };
    let transport = SseTransport::new(config).context("Failed to build stream transport")?;

    let store = Arc::new(ChatStore::new());
    let client = bind_client(settings, &store, Arc::new(transport));
    let mut rx = store.subscribe();

    if let Err(e) = client.send_message(text, files, None).await {
        print_changes(&mut renderer, &mut rx);
        return Err(e).context("Failed to send message");
    }

    loop {
        print_changes(&mut renderer, &mut rx);
        if store.read(|s| !s.is_loading && !s.is_connected) {
            break;
        }
        tokio::select! {
            changed = rx.changed() => if changed.is_err() { break },
            _ = tokio::signal::ctrl_c() => {
                client.stop();
                print_changes(&mut renderer, &mut rx);
                break;
            }
        }
    }
    Ok(())
}

/// Follow a thread until Ctrl-C or until reconnecting gives up.
async fn run_watch(settings: &ClientSettings, mut renderer: Renderer) -> Result<()> {
    let url = settings
        .socket_url(&settings.chat.thread_id)
        .context("Invalid server settings")?;
    let config = SocketConfig {
        url,
        heartbeat_interval: settings.transport.heartbeat_interval(),
        connect_timeout: settings.transport.connect_timeout(),
        reconnect: settings.transport.reconnect_policy(),
    };
    let socket = Arc::new(SocketTransport::new(config).context("Failed to build socket transport")?);

    let store = Arc::new(ChatStore::new());
    let client = bind_client(settings, &store, Arc::clone(&socket) as Arc<dyn Transport>);
    let mut rx = store.subscribe();
    client.connect().await.context("Failed to connect")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    let outcome = loop {
        print_changes(&mut renderer, &mut rx);
        tokio::select! {
            changed = rx.changed() => if changed.is_err() { break Ok(()) },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    if let Err(e) = client.send_message(&line, &[], None).await {
                        tracing::warn!(kind = e.kind(), error = %e, "message not sent");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = liveness.tick() => {
                if !socket.is_active() {
                    print_changes(&mut renderer, &mut rx);
                    let reason = store
                        .read(|s| s.error.clone())
                        .unwrap_or_else(|| "connection closed".to_owned());
                    break Err(reason);
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    client.stop();
    print_changes(&mut renderer, &mut rx);
    match outcome {
        Ok(()) => Ok(()),
        Err(reason) => bail!("{reason}"),
    }
}
