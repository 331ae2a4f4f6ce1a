//! Opcode bytes of the game protocol.

/// Packets sent by the client.
pub mod client {
    pub const LOGOUT: u8 = 0x14;
    pub const PING_BACK: u8 = 0x1D;
    pub const PING: u8 = 0x1E;
    pub const EXTENDED_OPCODE: u8 = 0x32;
    pub const AUTO_WALK: u8 = 0x64;
    pub const WALK_NORTH: u8 = 0x65;
    pub const WALK_EAST: u8 = 0x66;
    pub const WALK_SOUTH: u8 = 0x67;
    pub const WALK_WEST: u8 = 0x68;
    pub const STOP_WALK: u8 = 0x69;
    pub const WALK_NORTH_EAST: u8 = 0x6A;
    pub const WALK_SOUTH_EAST: u8 = 0x6B;
    pub const WALK_SOUTH_WEST: u8 = 0x6C;
    pub const WALK_NORTH_WEST: u8 = 0x6D;
    pub const TURN_NORTH: u8 = 0x6F;
    pub const TURN_EAST: u8 = 0x70;
    pub const TURN_SOUTH: u8 = 0x71;
    pub const TURN_WEST: u8 = 0x72;
    pub const LOOK_AT: u8 = 0x8C;
    pub const SAY: u8 = 0x96;
    pub const REQUEST_CHANNELS: u8 = 0x97;
    pub const OPEN_CHANNEL: u8 = 0x98;
    pub const CLOSE_CHANNEL: u8 = 0x99;
    pub const FIGHT_MODES: u8 = 0xA0;
    pub const ATTACK: u8 = 0xA1;
    pub const FOLLOW: u8 = 0xA2;
    pub const CANCEL_ATTACK_AND_FOLLOW: u8 = 0xBE;
    pub const REQUEST_OUTFIT: u8 = 0xD2;
    pub const SET_OUTFIT: u8 = 0xD3;
}

/// Packets sent by the server.
pub mod server {
    pub const DISCONNECT: u8 = 0x14;
    pub const LOGIN_SUCCESS: u8 = 0x17;
    pub const PING: u8 = 0x1D;
    pub const PING_BACK: u8 = 0x1E;
    pub const CHALLENGE: u8 = 0x1F;
    pub const EXTENDED_OPCODE: u8 = 0x32;
    pub const ADD_TILE_THING: u8 = 0x6A;
    pub const UPDATE_TILE_THING: u8 = 0x6B;
    pub const REMOVE_TILE_THING: u8 = 0x6C;
    pub const INVENTORY_SET: u8 = 0x78;
    pub const INVENTORY_CLEAR: u8 = 0x79;
    pub const TRADE_OWN: u8 = 0x7D;
    pub const TRADE_COUNTER: u8 = 0x7E;
    pub const TRADE_CLOSE: u8 = 0x7F;
    pub const CREATURE_HEALTH: u8 = 0x8C;
    pub const CREATURE_OUTFIT: u8 = 0x8E;
    pub const CREATURE_SPEED: u8 = 0x8F;
    pub const CREATURE_SAY: u8 = 0xAA;
    pub const CHANNELS_DIALOG: u8 = 0xAB;
    pub const OPEN_CHANNEL: u8 = 0xAC;
    pub const TEXT_MESSAGE: u8 = 0xB4;
    pub const MARKET_LEAVE: u8 = 0xF7;

    /// Creature marker inside a tile description: unknown creature follows.
    pub const CREATURE_UNKNOWN: u16 = 0x61;
    /// Creature marker inside a tile description: id of a known creature follows.
    pub const CREATURE_KNOWN: u16 = 0x62;
    /// Creature marker for a turn update.
    pub const CREATURE_TURN: u16 = 0x63;
}
