//! Command-line argument parsing for the gameworld server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Gameworld server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "gameworld-server", about = "Gameworld protocol server")]
pub struct CliArgs {
    /// Bind address for the game listener.
    #[arg(long)]
    pub bind: Option<String>,

    /// Game listener port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum simultaneous connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Maximum simultaneous live casts.
    #[arg(long)]
    pub max_casts: Option<u8>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.game_port = port;
        }
        if let Some(max) = args.max_connections {
            self.server.max_connections = max;
        }
        if let Some(casts) = args.max_casts {
            self.live_cast.max_casts = casts;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
