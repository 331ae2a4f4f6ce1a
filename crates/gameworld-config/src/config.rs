//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and socket settings.
    pub server: ServerConfig,
    /// Game protocol settings.
    pub protocol: ProtocolConfig,
    /// Live cast / spectator settings.
    pub live_cast: LiveCastConfig,
    /// Logging and debug settings.
    pub debug: DebugConfig,
}

/// Listener and socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the game listener binds to.
    pub bind_address: String,
    /// Port of the game protocol listener.
    pub game_port: u16,
    /// Maximum simultaneous connections (players and spectators).
    pub max_connections: usize,
    /// Disable Nagle's algorithm on accepted sockets.
    pub tcp_nodelay: bool,
    /// TCP keepalive idle time in seconds (0 disables keepalive).
    pub keepalive_seconds: u32,
}

/// Game protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Lowest accepted client protocol version (e.g. 1098 for 10.98).
    pub min_client_version: u16,
    /// Highest accepted client protocol version.
    pub max_client_version: u16,
    /// Number of creatures a client can hold full descriptions for.
    pub known_creature_capacity: usize,
    /// Largest accepted frame payload in bytes.
    pub max_frame_size: u16,
    /// Malformed packets tolerated before the session is dropped.
    pub violation_threshold: u32,
    /// Seconds without any inbound packet before the session is dropped.
    pub session_timeout_seconds: u32,
    /// Seconds between server pings.
    pub ping_interval_seconds: u32,
}

/// Live cast configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveCastConfig {
    /// Accept spectator logins at all.
    pub enabled: bool,
    /// Maximum simultaneous casts (at most 127).
    pub max_casts: u8,
    /// Maximum spectators per cast (at most 127).
    pub max_spectators: u8,
    /// File mirroring active cast metadata. Empty keeps it in memory only.
    pub cast_info_file: String,
    /// Spectator chat messages allowed per rate-limit window.
    pub spectator_chat_messages: u32,
    /// Length of the spectator chat rate-limit window in seconds.
    pub spectator_chat_window_seconds: u32,
    /// Maximum spectator chat message length in bytes.
    pub spectator_chat_max_length: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for the JSON log file. Empty disables file logging.
    pub log_dir: String,
    /// Write a JSON log file next to console output.
    pub json_file_logging: bool,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            game_port: 7172,
            max_connections: 1024,
            tcp_nodelay: true,
            keepalive_seconds: 60,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_client_version: 1098,
            max_client_version: 1100,
            known_creature_capacity: 250,
            max_frame_size: 24_590,
            violation_threshold: 10,
            session_timeout_seconds: 60,
            ping_interval_seconds: 10,
        }
    }
}

impl Default for LiveCastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_casts: i8::MAX as u8,
            max_spectators: i8::MAX as u8,
            cast_info_file: String::new(),
            spectator_chat_messages: 5,
            spectator_chat_window_seconds: 10,
            spectator_chat_max_length: 255,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: String::new(),
            json_file_logging: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the server (`<config_dir>/gameworld`),
    /// falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("gameworld"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the server cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.min_client_version > self.protocol.max_client_version {
            return Err(ConfigError::Invalid {
                field: "protocol.min_client_version",
                reason: format!(
                    "{} is above max_client_version {}",
                    self.protocol.min_client_version, self.protocol.max_client_version
                ),
            });
        }
        if self.protocol.known_creature_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "protocol.known_creature_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        let ceiling = i8::MAX as u8;
        if self.live_cast.max_casts > ceiling {
            return Err(ConfigError::Invalid {
                field: "live_cast.max_casts",
                reason: format!("must not exceed {ceiling}"),
            });
        }
        if self.live_cast.max_spectators > ceiling {
            return Err(ConfigError::Invalid {
                field: "live_cast.max_spectators",
                reason: format!("must not exceed {ceiling}"),
            });
        }
        Ok(())
    }
}
