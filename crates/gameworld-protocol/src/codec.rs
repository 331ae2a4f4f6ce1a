//! Encoders for the server's outbound packets.
//!
//! Every function here is pure: it renders values into an [`OutputMessage`]
//! and never touches session state. The session decides which packets go to
//! spectators and keeps the known-creature cache that feeds
//! [`add_creature`].

use gameworld_net::{OutputMessage, Position};

use crate::opcodes::server;
use crate::text_message::TextMessage;
use crate::types::{
    CreatureId, CreatureSnapshot, Direction, ItemKind, ItemRef, Outfit, PlayerId, SpeakClass,
};

/// Marker byte following every item and creature id.
const UNMARKED: u8 = 0xFF;
/// Animation phase byte asking the client to pick a random phase.
const RANDOM_PHASE: u8 = 0xFE;
/// Client tick length in milliseconds, announced at login.
pub const SERVER_BEAT: u16 = 0x32;

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Appends an item reference.
pub fn add_item(msg: &mut OutputMessage, item: &ItemRef) {
    msg.add_u16(item.client_id);
    msg.add_byte(UNMARKED);
    match item.kind {
        ItemKind::Stackable | ItemKind::Fluid => msg.add_byte(item.count),
        ItemKind::Plain => {}
    }
    if item.animated {
        msg.add_byte(RANDOM_PHASE);
    }
}

/// Appends an outfit. Item looks replace the colour block with the item id.
pub fn add_outfit(msg: &mut OutputMessage, outfit: &Outfit) {
    msg.add_u16(outfit.look_type);
    if outfit.look_type != 0 {
        msg.add_byte(outfit.head);
        msg.add_byte(outfit.body);
        msg.add_byte(outfit.legs);
        msg.add_byte(outfit.feet);
        msg.add_byte(outfit.addons);
    } else {
        msg.add_u16(outfit.look_type_ex);
    }
    msg.add_u16(outfit.mount);
}

/// Appends a creature description.
///
/// A creature the client already knows is sent by id only. Otherwise the full
/// description is sent, naming `remove` as the cache entry the client must
/// drop to make room (`0` when nothing was evicted).
pub fn add_creature(
    msg: &mut OutputMessage,
    creature: &CreatureSnapshot,
    known: bool,
    remove: Option<CreatureId>,
) {
    if known {
        msg.add_u16(server::CREATURE_KNOWN);
        msg.add_u32(creature.id.0);
    } else {
        msg.add_u16(server::CREATURE_UNKNOWN);
        msg.add_u32(remove.map_or(0, |id| id.0));
        msg.add_u32(creature.id.0);
        msg.add_byte(creature.kind as u8);
        msg.add_string(&creature.name);
    }

    msg.add_byte(creature.health_percent.min(100));
    msg.add_byte(creature.direction as u8);
    add_outfit(msg, &creature.outfit);
    msg.add_byte(creature.light_level);
    msg.add_byte(creature.light_color);
    msg.add_u16(creature.speed / 2);
    msg.add_byte(creature.skull);
    msg.add_byte(creature.shield);
    if !known {
        msg.add_byte(creature.emblem);
    }
    msg.add_byte(creature.kind as u8);
    // speech bubble
    msg.add_byte(0);
    msg.add_byte(UNMARKED);
    // helpers
    msg.add_u16(0);
    msg.add_byte(u8::from(creature.walkthrough));
}

// ---------------------------------------------------------------------------
// Connection management
// ---------------------------------------------------------------------------

/// Login challenge, the first packet of every connection.
pub fn challenge(timestamp: u32, random: u8) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CHALLENGE);
    msg.add_u32(timestamp);
    msg.add_byte(random);
    msg
}

/// Disconnect with a reason the client shows in a dialog.
pub fn disconnect(reason: &str) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::DISCONNECT);
    msg.add_string(reason);
    msg
}

pub fn login_success(player: PlayerId) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::LOGIN_SUCCESS);
    msg.add_u32(player.0);
    msg.add_u16(SERVER_BEAT);
    // can report bugs
    msg.add_byte(0);
    msg
}

pub fn ping() -> OutputMessage {
    OutputMessage::with_opcode(server::PING)
}

pub fn ping_back() -> OutputMessage {
    OutputMessage::with_opcode(server::PING_BACK)
}

pub fn extended_opcode(opcode: u8, buffer: &str) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::EXTENDED_OPCODE);
    msg.add_byte(opcode);
    msg.add_string(buffer);
    msg
}

// ---------------------------------------------------------------------------
// Creatures on the map
// ---------------------------------------------------------------------------

pub fn add_tile_creature(
    position: Position,
    stack_pos: u8,
    creature: &CreatureSnapshot,
    known: bool,
    remove: Option<CreatureId>,
) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::ADD_TILE_THING);
    msg.add_position(position);
    msg.add_byte(stack_pos);
    add_creature(&mut msg, creature, known, remove);
    msg
}

pub fn remove_tile_thing(position: Position, stack_pos: u8) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::REMOVE_TILE_THING);
    msg.add_position(position);
    msg.add_byte(stack_pos);
    msg
}

pub fn creature_turn(
    creature: CreatureId,
    position: Position,
    stack_pos: u8,
    direction: Direction,
    walkthrough: bool,
) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::UPDATE_TILE_THING);
    msg.add_position(position);
    msg.add_byte(stack_pos);
    msg.add_u16(server::CREATURE_TURN);
    msg.add_u32(creature.0);
    msg.add_byte(direction as u8);
    msg.add_byte(u8::from(walkthrough));
    msg
}

pub fn creature_health(creature: CreatureId, health_percent: u8) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_HEALTH);
    msg.add_u32(creature.0);
    msg.add_byte(health_percent.min(100));
    msg
}

pub fn creature_outfit(creature: CreatureId, outfit: &Outfit) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_OUTFIT);
    msg.add_u32(creature.0);
    add_outfit(&mut msg, outfit);
    msg
}

/// Speeds travel halved, as the client expects.
pub fn change_speed(creature: CreatureId, base_speed: u16, speed: u16) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_SPEED);
    msg.add_u32(creature.0);
    msg.add_u16(base_speed / 2);
    msg.add_u16(speed / 2);
    msg
}

// ---------------------------------------------------------------------------
// Speech and channels
// ---------------------------------------------------------------------------

/// Speech heard around `position`.
pub fn creature_say(
    speaker: &str,
    class: SpeakClass,
    text: &str,
    position: Position,
) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_SAY);
    // statement id
    msg.add_u32(0);
    msg.add_string(speaker);
    // speaker level
    msg.add_u16(0);
    msg.add_byte(class as u8);
    msg.add_position(position);
    msg.add_string(text);
    msg
}

pub fn channel_message(author: &str, text: &str, class: SpeakClass, channel: u16) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_SAY);
    msg.add_u32(0);
    msg.add_string(author);
    msg.add_u16(0);
    msg.add_byte(class as u8);
    msg.add_u16(channel);
    msg.add_string(text);
    msg
}

pub fn private_message(speaker: &str, class: SpeakClass, text: &str) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CREATURE_SAY);
    msg.add_u32(0);
    msg.add_string(speaker);
    msg.add_u16(0);
    msg.add_byte(class as u8);
    msg.add_string(text);
    msg
}

/// List of channels the player may open.
pub fn channels_dialog(channels: &[(u16, String)]) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::CHANNELS_DIALOG);
    let count = channels.len().min(u8::MAX as usize);
    msg.add_byte(count as u8);
    for (id, name) in &channels[..count] {
        msg.add_u16(*id);
        msg.add_string(name);
    }
    msg
}

pub fn open_channel(channel: u16, name: &str) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::OPEN_CHANNEL);
    msg.add_u16(channel);
    msg.add_string(name);
    // joined and invited member lists
    msg.add_u16(0);
    msg.add_u16(0);
    msg
}

/// Server text message. Damage, heal and experience classes float numbers
/// over a position; guild and party classes name their channel.
pub fn text_message(message: &TextMessage) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(server::TEXT_MESSAGE);
    msg.add_byte(message.class as u8);

    let position = message.position.unwrap_or_default();
    let primary = message.primary.unwrap_or_default();
    let secondary = message.secondary.unwrap_or_default();
    if message.class.has_two_values() {
        msg.add_position(position);
        msg.add_u32(primary.value);
        msg.add_byte(primary.color.0);
        msg.add_u32(secondary.value);
        msg.add_byte(secondary.color.0);
    } else if message.class.has_one_value() {
        msg.add_position(position);
        msg.add_u32(primary.value);
        msg.add_byte(primary.color.0);
    } else if message.class.has_channel() {
        msg.add_u16(message.channel_id.unwrap_or_default());
    }

    msg.add_string(&message.text);
    msg
}

// ---------------------------------------------------------------------------
// Inventory, trade and market
// ---------------------------------------------------------------------------

/// Inventory slot update. `None` clears the slot.
pub fn inventory_item(slot: u8, item: Option<&ItemRef>) -> OutputMessage {
    match item {
        Some(item) => {
            let mut msg = OutputMessage::with_opcode(server::INVENTORY_SET);
            msg.add_byte(slot);
            add_item(&mut msg, item);
            msg
        }
        None => {
            let mut msg = OutputMessage::with_opcode(server::INVENTORY_CLEAR);
            msg.add_byte(slot);
            msg
        }
    }
}

/// Trade offer window. `own` selects the player's side of the window.
pub fn trade_item_request(trader: &str, items: &[ItemRef], own: bool) -> OutputMessage {
    let opcode = if own {
        server::TRADE_OWN
    } else {
        server::TRADE_COUNTER
    };
    let mut msg = OutputMessage::with_opcode(opcode);
    msg.add_string(trader);
    let count = items.len().min(u8::MAX as usize);
    msg.add_byte(count as u8);
    for item in &items[..count] {
        add_item(&mut msg, item);
    }
    msg
}

pub fn close_trade() -> OutputMessage {
    OutputMessage::with_opcode(server::TRADE_CLOSE)
}

pub fn market_leave() -> OutputMessage {
    OutputMessage::with_opcode(server::MARKET_LEAVE)
}
