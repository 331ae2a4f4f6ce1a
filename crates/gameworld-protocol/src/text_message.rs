//! Server text messages and their optional numeric annotations.

use gameworld_net::Position;

/// Class byte of a server text message. It decides where the client shows the
/// text and which extra fields precede it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageClass {
    ConsoleBlue = 4,
    ConsoleRed = 13,
    StatusDefault = 17,
    Warning = 18,
    EventAdvance = 19,
    StatusSmall = 21,
    InfoDescription = 22,
    DamageDealt = 23,
    DamageReceived = 24,
    Healed = 25,
    Experience = 26,
    DamageOthers = 27,
    HealedOthers = 28,
    ExperienceOthers = 29,
    EventDefault = 30,
    Loot = 31,
    Guild = 33,
    PartyManagement = 34,
    Party = 35,
}

impl MessageClass {
    /// Classes carrying a position plus primary and secondary annotations.
    pub fn has_two_values(self) -> bool {
        matches!(
            self,
            Self::DamageDealt | Self::DamageReceived | Self::DamageOthers
        )
    }

    /// Classes carrying a position plus a single annotation.
    pub fn has_one_value(self) -> bool {
        matches!(
            self,
            Self::Healed | Self::HealedOthers | Self::Experience | Self::ExperienceOthers
        )
    }

    /// Classes routed into a chat channel.
    pub fn has_channel(self) -> bool {
        matches!(self, Self::Guild | Self::PartyManagement | Self::Party)
    }
}

/// Colour byte of an animated number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextColor(pub u8);

impl TextColor {
    pub const BLUE: Self = Self(5);
    pub const LIGHT_GREEN: Self = Self(30);
    pub const LIGHT_BLUE: Self = Self(35);
    pub const MAYA_BLUE: Self = Self(95);
    pub const DARK_RED: Self = Self(108);
    pub const LIGHT_GREY: Self = Self(129);
    pub const SKY_BLUE: Self = Self(143);
    pub const PURPLE: Self = Self(155);
    pub const RED: Self = Self(180);
    pub const ORANGE: Self = Self(198);
    pub const YELLOW: Self = Self(210);
    pub const WHITE_EXP: Self = Self(215);
    pub const NONE: Self = Self(255);
}

/// A number floated above a map position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotation {
    pub value: u32,
    pub color: TextColor,
}

/// A message for the client's status bar, console or a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub class: MessageClass,
    pub text: String,
    pub position: Option<Position>,
    pub channel_id: Option<u16>,
    pub primary: Option<Annotation>,
    pub secondary: Option<Annotation>,
}

impl TextMessage {
    pub fn new(class: MessageClass, text: impl Into<String>) -> Self {
        Self {
            class,
            text: text.into(),
            position: None,
            channel_id: None,
            primary: None,
            secondary: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn on_channel(mut self, channel_id: u16) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn with_primary(mut self, value: u32, color: TextColor) -> Self {
        self.primary = Some(Annotation { value, color });
        self
    }

    pub fn with_secondary(mut self, value: u32, color: TextColor) -> Self {
        self.secondary = Some(Annotation { value, color });
        self
    }
}
