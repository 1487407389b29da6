//! Amadeus Server — standalone HTTP/WebSocket server hosting the room
//! engine (`amadeus-core`). Composition root only: wires a `RoomRegistry`,
//! a `SessionDirectory`, and a fixture `SongLibrary` together and starts
//! the axum server, the same shape as the teacher's `apps/server/src/main.rs`
//! (parse args, init logging, load config, bootstrap services, serve,
//! wait for a shutdown signal).

mod config;
mod http;
mod song_library;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use amadeus_core::{InMemorySessionDirectory, RoomRegistry, SessionDirectory, SongLibrary};
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;
use crate::song_library::FixtureSongLibrary;
use crate::state::AppState;

/// Amadeus Server — real-time music-guessing game room engine.
#[derive(Parser, Debug)]
#[command(name = "amadeus-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AMADEUS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "AMADEUS_BIND_PORT")]
    port: Option<u16>,

    /// Path to a song manifest JSON file (overrides config file).
    #[arg(short = 's', long, env = "AMADEUS_SONG_MANIFEST")]
    song_manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Amadeus Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(manifest) = args.song_manifest {
        config.song_manifest = Some(manifest);
    }

    let library: Arc<dyn SongLibrary> = match &config.song_manifest {
        Some(path) => {
            log::info!("Loading song manifest from {}", path.display());
            FixtureSongLibrary::from_manifest(path).context("Failed to load song manifest")?
        }
        None => {
            log::info!("No song manifest configured, using built-in demo questions");
            FixtureSongLibrary::builtin()
        }
    };

    let sessions = Arc::new(InMemorySessionDirectory::new());
    let sessions_dyn: Arc<dyn SessionDirectory> = sessions.clone();
    let spawner = Arc::new(amadeus_core::runtime::TokioSpawner::current());

    let registry = RoomRegistry::with_default_config(library, sessions_dyn, spawner, config.to_room_config());

    let state = AppState { registry, sessions };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.bind_port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    log::info!("Amadeus Server listening on http://{addr}");
    let app = http::create_router(state);

    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("Server error: {err}");
        }
    });

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");
    server.abort();
    log::info!("Shutdown complete");

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
