//! Game protocol session layer.
//!
//! One [`ProtocolSession`] per client connection decodes opcoded packets into
//! deferred calls on the [`GameWorld`], and renders state changes back onto
//! the wire. A session whose player is live casting mirrors its
//! broadcast-eligible output to every admitted spectator through its
//! [`LiveCast`]; the process-wide [`LiveCastRegistry`] tracks which sessions
//! are casting.

pub mod cast_store;
pub mod codec;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod game;
mod handlers;
pub mod handshake;
pub mod known_creatures;
pub mod live_cast;
pub mod opcodes;
pub mod outbox;
pub mod session;
pub mod settings;
pub mod spectator_session;
pub mod spectators;
pub mod text_message;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cast_store::{
    CastInfo, CastInfoStore, MemoryCastStore, RonCastStore, StoreError, StoreWriter,
};
pub use connection::GameProtocol;
pub use context::SessionContext;
pub use dispatch::{OpcodeTable, PacketHandler};
pub use error::{CastError, HandshakeError, ProtocolError, SendError};
pub use executor::{Dispatcher, DispatcherThread};
pub use game::{GameWorld, LoginRequest};
pub use handshake::{Challenge, LoginPacket};
pub use known_creatures::{KnownCreatures, Remembered};
pub use live_cast::{CastSummary, LiveCastRegistry};
pub use outbox::{Frame, Outbound, Outbox, OutboxReceiver, outbox};
pub use session::{CAST_CHANNEL_NAME, Handshake, ProtocolSession, SessionState};
pub use settings::{LiveCastSettings, ProtocolSettings};
pub use spectator_session::{ChatThrottle, SpectatorConnection};
pub use spectators::{BroadcastReport, CastSnapshot, LiveCast, SpectatorEndpoint};
pub use text_message::{Annotation, MessageClass, TextColor, TextMessage};
pub use types::{
    CAST_CHANNEL_ID, CreatureId, CreatureKind, CreatureSnapshot, Direction, FightModes, ItemKind,
    ItemRef, OperatingSystem, Outfit, PlayerId, SpeakClass, Speech,
};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
