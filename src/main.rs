//! Claude Chat - Streaming turn reconciliation for the Claude Code CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_core::Stream;
use futures_util::StreamExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_chat::config::{ConfigLoader, EngineConfig};
use claude_chat::display;
use claude_chat::engine::{ChatEngine, EngineNotification};
use claude_chat::store::{JsonFileStore, NullStore, SessionStore};

#[derive(Parser)]
#[command(
    name = "claude-chat",
    about = "Streaming chat over the Claude Code CLI",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a config file (overrides the default search).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and stream the reply.
    Send {
        /// The message to send.
        message: String,
        /// Resume an existing session by id.
        #[arg(long)]
        resume: Option<String>,
        /// Working directory for the Claude process.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Skip persisting the exchange to the session store.
        #[arg(long)]
        no_store: bool,
    },
    /// List recent sessions.
    Sessions,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> EngineConfig {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    match loader.load() {
        Ok(config) => config,
        Err(err) => {
            display::print_error(&err.to_string());
            std::process::exit(1);
        }
    }
}

fn store_path(config: &EngineConfig) -> PathBuf {
    config
        .store_path
        .clone()
        .or_else(JsonFileStore::default_path)
        .unwrap_or_else(|| {
            display::print_error("No data directory available for the session store");
            std::process::exit(1);
        })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config);

    match cli.command {
        Commands::Send {
            message,
            resume,
            cwd,
            no_store,
        } => {
            if let Some(dir) = cwd {
                config.working_dir = Some(dir);
            }
            let exit = if no_store {
                send(config, NullStore, resume, &message).await
            } else {
                let store = JsonFileStore::new(store_path(&config));
                send(config, store, resume, &message).await
            };
            std::process::exit(exit);
        }
        Commands::Sessions => {
            let store = JsonFileStore::new(store_path(&config));
            match store.sessions().await {
                Ok(sessions) => {
                    if sessions.is_empty() {
                        println!("No sessions in the last 30 days.");
                    }
                    for session in &sessions {
                        display::print_session_line(session);
                    }
                }
                Err(err) => {
                    display::print_error(&err.to_string());
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Run one turn to completion, pacing output to the terminal.
async fn send<S: SessionStore>(
    config: EngineConfig,
    store: S,
    resume: Option<String>,
    message: &str,
) -> i32 {
    let (engine, notifications) = ChatEngine::new(config, store);
    let mut engine = match resume {
        Some(id) => engine.with_session(id),
        None => engine,
    };

    display::print_prompt(message);
    if let Err(err) = engine.send(message) {
        display::print_error(&err.to_string());
        return 1;
    }

    run_until_complete(&mut engine, notifications).await
}

async fn run_until_complete<S: SessionStore>(
    engine: &mut ChatEngine<S>,
    mut notifications: impl Stream<Item = EngineNotification> + Unpin,
) -> i32 {
    // Snapshots usually extend what is on screen, but a final result
    // can replace the streamed draft outright; the printer restarts on
    // a fresh line when that happens.
    let mut printer = display::SnapshotPrinter::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, aborting turn");
                engine.abort();
            }

            note = notifications.next() => {
                match note {
                    Some(EngineNotification::Snapshot(text)) => {
                        printer.print(&text);
                    }
                    Some(EngineNotification::SessionId(id)) => {
                        display::print_session_id(&id);
                    }
                    Some(EngineNotification::Diagnostic(text)) => {
                        display::print_diagnostic(&text);
                    }
                    Some(EngineNotification::TurnComplete { is_error, .. }) => {
                        display::print_turn_complete(is_error);
                        return i32::from(is_error);
                    }
                    None => return 1,
                }
            }
        }
    }
}
