//! Parsers for client packets.
//!
//! Each parser decodes its arguments completely, then either answers from
//! session state or defers the request to the game executor.

use gameworld_net::NetworkMessage;

use crate::error::ProtocolError;
use crate::session::ProtocolSession;
use crate::types::{
    CAST_CHANNEL_ID, CreatureId, Direction, FightModes, Outfit, SpeakClass, Speech,
};

type HandlerResult = Result<(), ProtocolError>;

const MAX_SPEECH_LENGTH: usize = 255;
const MAX_RECEIVER_LENGTH: usize = 30;
const MAX_EXTENDED_BUFFER: usize = 8192;

pub(crate) fn logout(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    session.logout(false);
    Ok(())
}

/// Answer to a server ping. Arrival alone refreshes the idle timer.
pub(crate) fn ping_back(_session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    Ok(())
}

pub(crate) fn ping(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    session.send_ping_back();
    session.add_game_task(|game, player| game.player_receive_ping(player));
    Ok(())
}

pub(crate) fn extended_opcode(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let opcode = msg.get_byte()?;
    let buffer = msg.get_string_limited(MAX_EXTENDED_BUFFER)?;
    if !session.operating_system().is_some_and(|os| os.is_otclient()) {
        return Ok(());
    }
    session.add_game_task(move |game, player| game.player_extended_opcode(player, opcode, buffer));
    Ok(())
}

pub(crate) fn auto_walk(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let steps = msg.get_byte()? as usize;
    if steps == 0 {
        return Ok(());
    }
    let mut path = Vec::with_capacity(steps);
    for _ in 0..steps {
        let raw = msg.get_byte()?;
        let direction = Direction::from_path_step(raw).ok_or(ProtocolError::InvalidValue {
            field: "path step",
            value: raw.into(),
        })?;
        path.push(direction);
    }
    session.add_game_task(move |game, player| game.player_auto_walk(player, path));
    Ok(())
}

fn walk(session: &ProtocolSession, direction: Direction) -> HandlerResult {
    session.add_game_task(move |game, player| game.player_walk(player, direction));
    Ok(())
}

fn turn(session: &ProtocolSession, direction: Direction) -> HandlerResult {
    session.add_game_task(move |game, player| game.player_turn(player, direction));
    Ok(())
}

macro_rules! fixed_direction_handlers {
    ($action:ident: $($name:ident => $direction:expr),+ $(,)?) => {
        $(
            pub(crate) fn $name(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
                $action(session, $direction)
            }
        )+
    };
}

fixed_direction_handlers!(walk:
    walk_north => Direction::North,
    walk_east => Direction::East,
    walk_south => Direction::South,
    walk_west => Direction::West,
    walk_north_east => Direction::NorthEast,
    walk_south_east => Direction::SouthEast,
    walk_south_west => Direction::SouthWest,
    walk_north_west => Direction::NorthWest,
);

fixed_direction_handlers!(turn:
    turn_north => Direction::North,
    turn_east => Direction::East,
    turn_south => Direction::South,
    turn_west => Direction::West,
);

pub(crate) fn stop_walk(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    session.add_game_task(|game, player| game.player_stop_walk(player));
    Ok(())
}

pub(crate) fn look_at(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let position = msg.get_position()?;
    let item_id = msg.get_u16()?;
    let stack_pos = msg.get_byte()?;
    session.add_game_task(move |game, player| {
        game.player_look_at(player, position, item_id, stack_pos)
    });
    Ok(())
}

/// Speech on the cast channel never reaches the game: it is mirrored straight
/// to the caster's audience.
pub(crate) fn say(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let raw_class = msg.get_byte()?;
    let class = SpeakClass::from_wire(raw_class).ok_or(ProtocolError::InvalidValue {
        field: "speak class",
        value: raw_class.into(),
    })?;
    let receiver = if class.has_receiver() {
        Some(msg.get_string_limited(MAX_RECEIVER_LENGTH)?)
    } else {
        None
    };
    let channel = if class.has_channel() {
        Some(msg.get_u16()?)
    } else {
        None
    };
    let text = msg.get_string_limited(MAX_SPEECH_LENGTH)?;

    if channel == Some(CAST_CHANNEL_ID) {
        session.forward_chat_to_spectators(&text);
        return Ok(());
    }

    let speech = Speech {
        class,
        receiver,
        channel,
        text,
    };
    session.add_game_task(move |game, player| game.player_say(player, speech));
    Ok(())
}

pub(crate) fn request_channels(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    session.add_game_task(|game, player| game.player_request_channels(player));
    Ok(())
}

pub(crate) fn open_channel(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let channel = msg.get_u16()?;
    session.add_game_task(move |game, player| game.player_open_channel(player, channel));
    Ok(())
}

pub(crate) fn close_channel(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let channel = msg.get_u16()?;
    session.add_game_task(move |game, player| game.player_close_channel(player, channel));
    Ok(())
}

pub(crate) fn fight_modes(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let stance = msg.get_byte()?;
    let chase = msg.get_byte()?;
    let secure = msg.get_byte()?;
    if !(1..=3).contains(&stance) {
        return Err(ProtocolError::InvalidValue {
            field: "fight stance",
            value: stance.into(),
        });
    }
    let modes = FightModes {
        stance,
        chase: chase == 1,
        secure: secure == 1,
    };
    session.add_game_task(move |game, player| game.player_set_fight_modes(player, modes));
    Ok(())
}

pub(crate) fn attack(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let target = CreatureId(msg.get_u32()?);
    session.add_game_task(move |game, player| game.player_attack(player, target));
    Ok(())
}

pub(crate) fn follow(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let target = CreatureId(msg.get_u32()?);
    session.add_game_task(move |game, player| game.player_follow(player, target));
    Ok(())
}

pub(crate) fn cancel_attack_and_follow(
    session: &ProtocolSession,
    _msg: &mut NetworkMessage,
) -> HandlerResult {
    session.add_game_task(|game, player| game.player_cancel_attack_and_follow(player));
    Ok(())
}

pub(crate) fn request_outfit(session: &ProtocolSession, _msg: &mut NetworkMessage) -> HandlerResult {
    session.add_game_task(|game, player| game.player_request_outfit(player));
    Ok(())
}

pub(crate) fn set_outfit(session: &ProtocolSession, msg: &mut NetworkMessage) -> HandlerResult {
    let outfit = Outfit {
        look_type: msg.get_u16()?,
        head: msg.get_byte()?,
        body: msg.get_byte()?,
        legs: msg.get_byte()?,
        feet: msg.get_byte()?,
        addons: msg.get_byte()?,
        mount: msg.get_u16()?,
        look_type_ex: 0,
    };
    session.add_game_task(move |game, player| game.player_change_outfit(player, outfit));
    Ok(())
}
