//! lo-server - learning-analytics event ingestion service
//!
//! Runs client events through the writing-analysis reducers and serves the
//! resulting state. The `replay` subcommand recomputes state from an event
//! log without starting the HTTP server.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lo_common::config::{ConfigResolver, LoggingConfig, TomlConfig};
use lo_common::kvs::open_kvs;
use lo_reducers::{replay_file, ReducerRegistry};
use lo_server::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for lo-server
#[derive(Parser, Debug)]
#[command(name = "lo-server")]
#[command(about = "Learning-analytics event ingestion service")]
#[command(version)]
struct Args {
    /// Configuration file (overrides LO_CONFIG_FILE and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long, env = "LO_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Recompute reducer state from a JSON-lines event log
    Replay {
        /// Event log, one JSON event per line
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone());
    let source = resolver.resolve();
    let config = resolver.load().context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    info!(
        "Starting lo-server v{} (configuration: {:?})",
        env!("CARGO_PKG_VERSION"),
        source
    );

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, args.port).await,
        Command::Replay { file } => replay(config, file).await,
    }
}

/// Initialize tracing: `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

async fn serve(config: TomlConfig, port: Option<u16>) -> Result<()> {
    let kvs = open_kvs(&config.kvs)
        .await
        .context("Failed to open key-value store")?;
    info!("✓ Key-value store ready ({:?})", config.kvs.backend);

    let state = AppState::new(kvs, config.writing_observer.clone());
    info!("Reducers: {}", state.registry.names().join(", "));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("lo-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn replay(config: TomlConfig, file: PathBuf) -> Result<()> {
    let kvs = open_kvs(&config.kvs)
        .await
        .context("Failed to open key-value store")?;
    let registry = ReducerRegistry::writing_observer(&config.writing_observer);

    let summary = replay_file(&registry, kvs, &file)
        .await
        .with_context(|| format!("Replay of {} failed", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
