//! Gameworld server entry point.
//!
//! Loads `config.ron`, applies CLI overrides, and serves the game protocol
//! until Ctrl+C. Live cast metadata is mirrored to a RON file when
//! `live_cast.cast_info_file` is set.
//!
//! Run with: `cargo run -p gameworld-server -- --port 7172`

mod lobby;
mod settings;

use std::sync::Arc;

use clap::Parser;
use gameworld_config::{CliArgs, Config, ConfigError};
use gameworld_net::GameServer;
use gameworld_protocol::{
    CastInfoStore, Dispatcher, GameProtocol, LiveCastRegistry, MemoryCastStore, RonCastStore,
    SessionContext, StoreError,
};
use tracing::info;

use crate::lobby::LobbyWorld;
use crate::settings::BindAddressError;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    BindAddress(#[from] BindAddressError),
    #[error("cast store: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn open_cast_store(path: &str) -> Result<Arc<dyn CastInfoStore>, StoreError> {
    if path.is_empty() {
        return Ok(Arc::new(MemoryCastStore::new()));
    }
    Ok(Arc::new(RonCastStore::open(path)?))
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(Config::default_dir);
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    gameworld_log::init_logging(Some(&config));
    info!("Config directory: {}", config_dir.display());

    let server_config = settings::server_config(&config)?;
    let protocol = settings::protocol_settings(&config);
    let live_cast = settings::cast_settings(&config);
    info!(
        "Protocol {}..{} | casts: enabled={}, max={}, spectators={}",
        protocol.min_version,
        protocol.max_version,
        live_cast.enabled,
        live_cast.max_casts,
        live_cast.max_spectators,
    );

    let store = open_cast_store(&config.live_cast.cast_info_file)?;
    let registry = Arc::new(LiveCastRegistry::new(live_cast.max_casts, store)?);
    // Rows left behind by a crash describe casts that no longer exist.
    registry.clear_all();

    let (dispatcher, mut game_thread) = Dispatcher::spawn(LobbyWorld::new())?;
    let context = Arc::new(SessionContext::new(
        protocol,
        live_cast,
        Arc::clone(&registry),
        dispatcher,
    ));

    let server = Arc::new(GameServer::new(server_config));
    let handler = Arc::new(GameProtocol::new(context));
    let accept_loop = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run(handler).await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl+C received, shutting down");
        }
        result = accept_loop => {
            match result {
                Ok(Ok(())) => info!("Accept loop stopped"),
                Ok(Err(e)) => {
                    tracing::error!("Game listener failed: {e}");
                    return Err(e.into());
                }
                Err(e) => tracing::error!("Accept loop panicked: {e}"),
            }
        }
    }

    server.shutdown();
    // Give connection handlers a moment to flush their disconnect notices.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    registry.clear_all();
    if !registry.flush_store() {
        tracing::warn!("Cast store writer stopped before shutdown");
    }
    game_thread.shutdown();
    info!("Server stopped");
    Ok(())
}
