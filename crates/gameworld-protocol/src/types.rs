//! Value types shared between the session layer and the game world.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Channel the live-cast chat runs on. Only messages on this channel are
/// mirrored to spectators.
pub const CAST_CHANNEL_ID: u16 = 0xFFFE;

/// Persistent identifier of a logged-in player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of any creature visible on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

impl From<PlayerId> for CreatureId {
    fn from(id: PlayerId) -> Self {
        Self(id.0)
    }
}

/// Client platform announced in the login packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Flash,
    OtClientLinux,
    OtClientWindows,
    OtClientMac,
    Unknown(u16),
}

impl OperatingSystem {
    pub fn from_wire(value: u16) -> Self {
        match value {
            1 => Self::Linux,
            2 => Self::Windows,
            3 => Self::Flash,
            10 => Self::OtClientLinux,
            11 => Self::OtClientWindows,
            12 => Self::OtClientMac,
            other => Self::Unknown(other),
        }
    }

    /// Extended opcodes are only understood by OTClient builds.
    pub fn is_otclient(self) -> bool {
        matches!(
            self,
            Self::OtClientLinux | Self::OtClientWindows | Self::OtClientMac
        )
    }
}

/// Facing and step direction. Diagonals carry bit 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    SouthWest = 4,
    SouthEast = 5,
    NorthWest = 6,
    NorthEast = 7,
}

impl Direction {
    pub fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::North,
            1 => Self::East,
            2 => Self::South,
            3 => Self::West,
            4 => Self::SouthWest,
            5 => Self::SouthEast,
            6 => Self::NorthWest,
            7 => Self::NorthEast,
            _ => return None,
        })
    }

    /// Decodes one step of an auto-walk path. The client numbers the
    /// directions counter-clockwise starting east.
    pub fn from_path_step(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::East,
            2 => Self::NorthEast,
            3 => Self::North,
            4 => Self::NorthWest,
            5 => Self::West,
            6 => Self::SouthWest,
            7 => Self::South,
            8 => Self::SouthEast,
            _ => return None,
        })
    }

    pub fn is_diagonal(self) -> bool {
        (self as u8) & 4 != 0
    }
}

/// Appearance of a creature.
///
/// `look_type == 0` means the creature looks like the item `look_type_ex`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outfit {
    pub look_type: u16,
    pub look_type_ex: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
    pub addons: u8,
    pub mount: u16,
}

/// How an item's count byte is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// No count on the wire.
    Plain,
    /// Count is the stack size.
    Stackable,
    /// Count is the fluid type.
    Fluid,
}

/// An item as the client renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRef {
    pub client_id: u16,
    pub count: u8,
    pub kind: ItemKind,
    /// Animated items carry an extra animation-phase byte.
    pub animated: bool,
}

impl ItemRef {
    pub fn plain(client_id: u16) -> Self {
        Self {
            client_id,
            count: 1,
            kind: ItemKind::Plain,
            animated: false,
        }
    }

    pub fn stackable(client_id: u16, count: u8) -> Self {
        Self {
            client_id,
            count,
            kind: ItemKind::Stackable,
            animated: false,
        }
    }

    pub fn fluid(client_id: u16, fluid: u8) -> Self {
        Self {
            client_id,
            count: fluid,
            kind: ItemKind::Fluid,
            animated: false,
        }
    }
}

/// Creature category as sent in the creature description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CreatureKind {
    Player = 0,
    Monster = 1,
    Npc = 2,
    SummonOwn = 3,
    SummonOthers = 4,
}

/// Everything needed to describe a creature to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatureSnapshot {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub health_percent: u8,
    pub direction: Direction,
    pub outfit: Outfit,
    pub light_level: u8,
    pub light_color: u8,
    pub speed: u16,
    pub skull: u8,
    pub shield: u8,
    pub emblem: u8,
    pub walkthrough: bool,
}

impl CreatureSnapshot {
    /// A healthy, plainly dressed creature facing south.
    pub fn new(id: CreatureId, name: impl Into<String>, kind: CreatureKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            health_percent: 100,
            direction: Direction::South,
            outfit: Outfit::default(),
            light_level: 0,
            light_color: 0,
            speed: 220,
            skull: 0,
            shield: 0,
            emblem: 0,
            walkthrough: false,
        }
    }
}

/// Speech class byte of a say packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpeakClass {
    Say = 1,
    Whisper = 2,
    Yell = 3,
    PrivateFrom = 4,
    PrivateTo = 5,
    ChannelYellow = 7,
    ChannelOrange = 8,
    PrivateNpcToPlayer = 10,
    PrivatePlayerToNpc = 12,
    Broadcast = 13,
    ChannelRed = 14,
    PrivateRedFrom = 15,
    PrivateRedTo = 16,
    MonsterSay = 36,
    MonsterYell = 37,
}

impl SpeakClass {
    pub fn from_wire(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Say,
            2 => Self::Whisper,
            3 => Self::Yell,
            4 => Self::PrivateFrom,
            5 => Self::PrivateTo,
            7 => Self::ChannelYellow,
            8 => Self::ChannelOrange,
            10 => Self::PrivateNpcToPlayer,
            12 => Self::PrivatePlayerToNpc,
            13 => Self::Broadcast,
            14 => Self::ChannelRed,
            15 => Self::PrivateRedFrom,
            16 => Self::PrivateRedTo,
            36 => Self::MonsterSay,
            37 => Self::MonsterYell,
            _ => return None,
        })
    }

    /// Classes addressed to a named receiver.
    pub fn has_receiver(self) -> bool {
        matches!(
            self,
            Self::PrivateTo | Self::PrivateRedTo | Self::PrivatePlayerToNpc
        )
    }

    /// Classes spoken into a channel.
    pub fn has_channel(self) -> bool {
        matches!(
            self,
            Self::ChannelYellow | Self::ChannelOrange | Self::ChannelRed
        )
    }

    /// Classes rendered at the speaker's position.
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            Self::Say | Self::Whisper | Self::Yell | Self::MonsterSay | Self::MonsterYell
        )
    }
}

/// A decoded say packet, handed to the game as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speech {
    pub class: SpeakClass,
    pub receiver: Option<String>,
    pub channel: Option<u16>,
    pub text: String,
}

/// Combat stance chosen in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FightModes {
    /// 1 offensive, 2 balanced, 3 defensive.
    pub stance: u8,
    pub chase: bool,
    pub secure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_wire_values() {
        for raw in 0..8u8 {
            let dir = Direction::from_wire(raw).unwrap();
            assert_eq!(dir as u8, raw);
        }
        assert_eq!(Direction::from_wire(8), None);
        assert!(Direction::NorthEast.is_diagonal());
        assert!(!Direction::West.is_diagonal());
    }

    #[test]
    fn test_path_steps_rotate_from_east() {
        assert_eq!(Direction::from_path_step(1), Some(Direction::East));
        assert_eq!(Direction::from_path_step(3), Some(Direction::North));
        assert_eq!(Direction::from_path_step(8), Some(Direction::SouthEast));
        assert_eq!(Direction::from_path_step(0), None);
        assert_eq!(Direction::from_path_step(9), None);
    }

    #[test]
    fn test_speak_class_shape() {
        assert!(SpeakClass::from_wire(7).unwrap().has_channel());
        assert!(SpeakClass::from_wire(5).unwrap().has_receiver());
        assert!(SpeakClass::Yell.is_positional());
        assert_eq!(SpeakClass::from_wire(6), None);
    }

    #[test]
    fn test_operating_system_flags_otclient() {
        assert!(OperatingSystem::from_wire(11).is_otclient());
        assert!(!OperatingSystem::from_wire(2).is_otclient());
        assert_eq!(OperatingSystem::from_wire(99), OperatingSystem::Unknown(99));
    }
}
