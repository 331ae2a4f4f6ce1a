//! Login challenge and the first client message.

use std::time::{SystemTime, UNIX_EPOCH};

use gameworld_net::{MessageError, NetworkMessage};

use crate::error::HandshakeError;
use crate::game::LoginRequest;
use crate::settings::ProtocolSettings;
use crate::types::OperatingSystem;

const MAX_NAME_LENGTH: usize = 30;
const MAX_PASSWORD_LENGTH: usize = 64;

/// Values the client must echo back in its login packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    pub timestamp: u32,
    pub random: u8,
}

impl Challenge {
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or_default();
        Self {
            timestamp,
            random: rand::random(),
        }
    }
}

/// Decoded first message of a game connection.
///
/// An empty account name marks a spectator: the character name then names
/// the cast to watch and the password is the cast password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPacket {
    pub operating_system: OperatingSystem,
    pub version: u16,
    pub account_name: String,
    pub character_name: String,
    pub password: String,
    pub challenge: Challenge,
}

impl LoginPacket {
    /// Wire layout: `u16 os`, `u16 version`, account, character and password
    /// strings, then the echoed `u32` timestamp and `u8` random byte.
    pub fn parse(msg: &mut NetworkMessage) -> Result<Self, MessageError> {
        let operating_system = OperatingSystem::from_wire(msg.get_u16()?);
        let version = msg.get_u16()?;
        let account_name = msg.get_string_limited(MAX_NAME_LENGTH)?;
        let character_name = msg.get_string_limited(MAX_NAME_LENGTH)?;
        let password = msg.get_string_limited(MAX_PASSWORD_LENGTH)?;
        let challenge = Challenge {
            timestamp: msg.get_u32()?,
            random: msg.get_byte()?,
        };
        Ok(Self {
            operating_system,
            version,
            account_name,
            character_name,
            password,
            challenge,
        })
    }

    pub fn is_spectator(&self) -> bool {
        self.account_name.is_empty()
    }

    /// Check the version range and the echoed challenge.
    pub fn validate(
        &self,
        sent: &Challenge,
        settings: &ProtocolSettings,
    ) -> Result<(), HandshakeError> {
        if !settings.accepts_version(self.version) {
            return Err(HandshakeError::UnsupportedVersion {
                version: self.version,
                allowed: settings.version_label(),
            });
        }
        if self.challenge != *sent {
            return Err(HandshakeError::ChallengeMismatch);
        }
        Ok(())
    }

    pub fn into_request(self) -> LoginRequest {
        LoginRequest {
            account_name: self.account_name,
            character_name: self.character_name,
            password: self.password,
            operating_system: self.operating_system,
            version: self.version,
        }
    }
}

/// Encode a login packet the way a client does.
#[cfg(test)]
pub(crate) fn encode_login(
    version: u16,
    account: &str,
    character: &str,
    password: &str,
    challenge: Challenge,
) -> Vec<u8> {
    let mut out = gameworld_net::OutputMessage::new();
    out.add_u16(2);
    out.add_u16(version);
    out.add_string(account);
    out.add_string(character);
    out.add_string(password);
    out.add_u32(challenge.timestamp);
    out.add_byte(challenge.random);
    out.into_bytes()
}
