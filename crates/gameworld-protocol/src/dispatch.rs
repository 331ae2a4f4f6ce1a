//! Opcode dispatch: maps the first byte of a packet to its parser.
//!
//! The table is built once at startup and shared read-only by every session.
//! Handlers decode their arguments synchronously and defer any game work to
//! the executor, so a malformed packet is rejected before anything is queued.

use std::fmt;

use gameworld_net::NetworkMessage;

use crate::error::ProtocolError;
use crate::handlers;
use crate::opcodes::client;
use crate::session::ProtocolSession;

/// Parser for one client opcode. The cursor sits just past the opcode byte.
pub type PacketHandler = fn(&ProtocolSession, &mut NetworkMessage) -> Result<(), ProtocolError>;

/// Dense opcode-to-handler table.
#[derive(Clone)]
pub struct OpcodeTable {
    handlers: [Option<PacketHandler>; 256],
}

impl OpcodeTable {
    /// A table that routes nothing.
    pub fn empty() -> Self {
        Self {
            handlers: [None; 256],
        }
    }

    /// Every packet a logged-in player may send.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(client::LOGOUT, handlers::logout);
        table.register(client::PING_BACK, handlers::ping_back);
        table.register(client::PING, handlers::ping);
        table.register(client::EXTENDED_OPCODE, handlers::extended_opcode);
        table.register(client::AUTO_WALK, handlers::auto_walk);
        table.register(client::WALK_NORTH, handlers::walk_north);
        table.register(client::WALK_EAST, handlers::walk_east);
        table.register(client::WALK_SOUTH, handlers::walk_south);
        table.register(client::WALK_WEST, handlers::walk_west);
        table.register(client::STOP_WALK, handlers::stop_walk);
        table.register(client::WALK_NORTH_EAST, handlers::walk_north_east);
        table.register(client::WALK_SOUTH_EAST, handlers::walk_south_east);
        table.register(client::WALK_SOUTH_WEST, handlers::walk_south_west);
        table.register(client::WALK_NORTH_WEST, handlers::walk_north_west);
        table.register(client::TURN_NORTH, handlers::turn_north);
        table.register(client::TURN_EAST, handlers::turn_east);
        table.register(client::TURN_SOUTH, handlers::turn_south);
        table.register(client::TURN_WEST, handlers::turn_west);
        table.register(client::LOOK_AT, handlers::look_at);
        table.register(client::SAY, handlers::say);
        table.register(client::REQUEST_CHANNELS, handlers::request_channels);
        table.register(client::OPEN_CHANNEL, handlers::open_channel);
        table.register(client::CLOSE_CHANNEL, handlers::close_channel);
        table.register(client::FIGHT_MODES, handlers::fight_modes);
        table.register(client::ATTACK, handlers::attack);
        table.register(client::FOLLOW, handlers::follow);
        table.register(client::CANCEL_ATTACK_AND_FOLLOW, handlers::cancel_attack_and_follow);
        table.register(client::REQUEST_OUTFIT, handlers::request_outfit);
        table.register(client::SET_OUTFIT, handlers::set_outfit);
        table
    }

    /// Install `handler` for `opcode`, returning the one it replaces.
    pub fn register(&mut self, opcode: u8, handler: PacketHandler) -> Option<PacketHandler> {
        self.handlers[opcode as usize].replace(handler)
    }

    pub fn get(&self, opcode: u8) -> Option<PacketHandler> {
        self.handlers[opcode as usize]
    }

    /// Opcodes with a handler, ascending.
    pub fn registered_opcodes(&self) -> Vec<u8> {
        (0..=u8::MAX)
            .filter(|opcode| self.handlers[*opcode as usize].is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcodeTable")
            .field("opcodes", &self.registered_opcodes())
            .finish()
    }
}
