//! Runtime knobs of the session layer, resolved from the server config.

use std::time::Duration;

use gameworld_net::FrameConfig;

/// Largest audience or cast count: both are tracked in a signed byte by the
/// client and the persisted cast metadata.
pub const CAST_CEILING: u8 = i8::MAX as u8;

/// Protocol behaviour shared by every session.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    /// Oldest accepted client version, e.g. `1098`.
    pub min_version: u16,
    /// Newest accepted client version.
    pub max_version: u16,
    pub known_creature_capacity: usize,
    /// Malformed packets tolerated before the client is disconnected.
    pub violation_threshold: u32,
    /// A connection silent for this long is closed.
    pub session_timeout: Duration,
    /// How often an idle client is pinged.
    pub ping_interval: Duration,
    pub frame: FrameConfig,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            min_version: 1098,
            max_version: 1100,
            known_creature_capacity: 250,
            violation_threshold: 10,
            session_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(10),
            frame: FrameConfig::default(),
        }
    }
}

impl ProtocolSettings {
    /// Accepted version as the client prints it, e.g. `10.98`.
    pub fn version_label(&self) -> String {
        format!("{}.{:02}", self.min_version / 100, self.min_version % 100)
    }

    pub fn accepts_version(&self, version: u16) -> bool {
        (self.min_version..=self.max_version).contains(&version)
    }
}

/// Live-cast limits and spectator chat throttling.
#[derive(Debug, Clone)]
pub struct LiveCastSettings {
    pub enabled: bool,
    /// Simultaneous casts, capped at [`CAST_CEILING`].
    pub max_casts: u8,
    /// Spectators per cast, capped at [`CAST_CEILING`].
    pub max_spectators: u8,
    /// Messages a spectator may send per `chat_window`.
    pub chat_messages: u32,
    pub chat_window: Duration,
    pub chat_max_length: usize,
}

impl Default for LiveCastSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_casts: CAST_CEILING,
            max_spectators: CAST_CEILING,
            chat_messages: 5,
            chat_window: Duration::from_secs(10),
            chat_max_length: 255,
        }
    }
}
