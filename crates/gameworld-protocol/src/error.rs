//! Error types for the protocol session layer.

use gameworld_net::MessageError;

/// A packet handler could not make sense of its arguments.
///
/// Raised before any work is deferred to the game executor. The session counts
/// it as a violation and discards the packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The packet ended early or a field broke a length limit.
    #[error("malformed packet: {0}")]
    Malformed(#[from] MessageError),

    /// A field decoded fine but carries a value the protocol does not define.
    #[error("invalid {field} value {value}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value read from the wire.
        value: u32,
    },
}

/// The first message of a connection was refused.
///
/// The `Display` text is what the client sees in its disconnect dialog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The login packet could not be decoded.
    #[error("Malformed login packet.")]
    Malformed(#[source] MessageError),

    /// Client protocol version outside the accepted range.
    #[error("Only clients with protocol {allowed} allowed!")]
    UnsupportedVersion {
        /// Version the client announced.
        version: u16,
        /// Human readable accepted version, e.g. `10.98`.
        allowed: String,
    },

    /// The client did not echo the challenge it was sent.
    #[error("Invalid connection request.")]
    ChallengeMismatch,

    /// A spectator login arrived while live casting is switched off.
    #[error("Live casts are not available on this server.")]
    CastsDisabled,
}

/// Live-cast operations that were refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CastError {
    /// The spectator supplied the wrong cast password.
    #[error("Wrong cast password.")]
    AuthenticationFailed,

    /// The server is at its cast limit, or the player already casts.
    #[error("Unable to start the cast, the limit of live casts has been reached.")]
    CastLimitExceeded,

    /// The cast reached its spectator ceiling.
    #[error("This cast is full.")]
    SpectatorLimitExceeded,

    /// The targeted player is not casting.
    #[error("This player is not casting.")]
    NotCasting,

    /// No player is attached to the session yet.
    #[error("No player is attached to this session.")]
    NoPlayer,

    /// Live casting is switched off in the configuration.
    #[error("Live casts are disabled.")]
    Disabled,
}

/// An outbound frame could not be queued because the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection's writer has stopped.
    #[error("connection closed")]
    Closed,
}
