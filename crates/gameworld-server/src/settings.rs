//! Maps the loaded [`Config`] onto the runtime settings of each layer.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

use gameworld_config::Config;
use gameworld_net::{FrameConfig, ServerConfig, SocketConfig};
use gameworld_protocol::{LiveCastSettings, ProtocolSettings};

/// The configured bind address is not an IP address.
#[derive(Debug, thiserror::Error)]
#[error("invalid bind address {address:?}: {source}")]
pub struct BindAddressError {
    pub address: String,
    #[source]
    pub source: AddrParseError,
}

pub fn server_config(config: &Config) -> Result<ServerConfig, BindAddressError> {
    let server = &config.server;
    let ip: IpAddr = server
        .bind_address
        .parse()
        .map_err(|source| BindAddressError {
            address: server.bind_address.clone(),
            source,
        })?;

    let socket = SocketConfig {
        tcp_nodelay: server.tcp_nodelay,
        keepalive_idle: (server.keepalive_seconds > 0)
            .then(|| Duration::from_secs(u64::from(server.keepalive_seconds))),
        ..SocketConfig::default()
    };

    Ok(ServerConfig {
        bind_addr: SocketAddr::new(ip, server.game_port),
        max_connections: server.max_connections,
        socket,
    })
}

pub fn protocol_settings(config: &Config) -> ProtocolSettings {
    let protocol = &config.protocol;
    ProtocolSettings {
        min_version: protocol.min_client_version,
        max_version: protocol.max_client_version,
        known_creature_capacity: protocol.known_creature_capacity,
        violation_threshold: protocol.violation_threshold,
        session_timeout: Duration::from_secs(u64::from(protocol.session_timeout_seconds)),
        ping_interval: Duration::from_secs(u64::from(protocol.ping_interval_seconds)),
        frame: FrameConfig {
            max_payload_size: protocol.max_frame_size,
        },
    }
}

pub fn cast_settings(config: &Config) -> LiveCastSettings {
    let cast = &config.live_cast;
    LiveCastSettings {
        enabled: cast.enabled,
        max_casts: cast.max_casts,
        max_spectators: cast.max_spectators,
        chat_messages: cast.spectator_chat_messages,
        chat_window: Duration::from_secs(u64::from(cast.spectator_chat_window_seconds)),
        chat_max_length: cast.spectator_chat_max_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_through() {
        let config = Config::default();
        let server = server_config(&config).unwrap();
        assert_eq!(server.bind_addr, "0.0.0.0:7172".parse().unwrap());
        assert_eq!(server.max_connections, 1024);
        assert_eq!(server.socket.keepalive_idle, Some(Duration::from_secs(60)));

        let protocol = protocol_settings(&config);
        assert_eq!(protocol.version_label(), "10.98");
        assert_eq!(protocol.frame.max_payload_size, 24_590);
        assert_eq!(protocol.session_timeout, Duration::from_secs(60));

        let cast = cast_settings(&config);
        assert!(cast.enabled);
        assert_eq!(cast.max_spectators, 127);
        assert_eq!(cast.chat_window, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_keepalive_disables_it() {
        let mut config = Config::default();
        config.server.keepalive_seconds = 0;
        config.server.tcp_nodelay = false;
        let server = server_config(&config).unwrap();
        assert!(server.socket.keepalive_idle.is_none());
        assert!(!server.socket.tcp_nodelay);
    }

    #[test]
    fn test_ipv6_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "::1".to_string();
        config.server.game_port = 7200;
        let server = server_config(&config).unwrap();
        assert_eq!(server.bind_addr, "[::1]:7200".parse().unwrap());
    }

    #[test]
    fn test_hostname_rejected() {
        let mut config = Config::default();
        config.server.bind_address = "localhost".to_string();
        let err = server_config(&config).unwrap_err();
        assert_eq!(err.address, "localhost");
    }
}
