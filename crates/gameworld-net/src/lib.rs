//! TCP networking: accept loop, socket options, length-prefixed framing and
//! the little-endian message reader/writer used by the game protocol.

pub mod framing;
pub mod message;
pub mod socket;
pub mod tcp_server;

pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use message::{MessageError, NetworkMessage, OutputMessage, Position};
pub use socket::{SocketConfig, configure_stream, create_listener};
pub use tcp_server::{
    ConnectionHandler, ConnectionId, ConnectionLimitReached, ConnectionMap, GameServer,
    IdGenerator, ServerConfig,
};
