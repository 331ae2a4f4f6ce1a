//! A minimal world: everyone stands in one room and hears everyone else.
//!
//! Players toggle their live cast with chat commands:
//!
//! ```text
//! !cast on [password]
//! !cast off
//! !cast
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use gameworld_net::Position;
use gameworld_protocol::{
    CAST_CHANNEL_ID, CAST_CHANNEL_NAME, GameWorld, LoginRequest, MessageClass, PlayerId,
    ProtocolSession, Speech, TextMessage,
};

const CAST_COMMAND: &str = "!cast";
const FIRST_PLAYER_ID: u32 = 0x1000_0000;
const SPAWN: Position = Position {
    x: 32369,
    y: 32241,
    z: 7,
};

pub struct LobbyWorld {
    players: HashMap<PlayerId, Arc<ProtocolSession>>,
    next_id: u32,
}

impl LobbyWorld {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            next_id: FIRST_PLAYER_ID,
        }
    }

    pub fn online(&self) -> usize {
        self.players.len()
    }

    fn find_by_name(&self, name: &str) -> Option<&Arc<ProtocolSession>> {
        self.players.values().find(|session| {
            session
                .player_name()
                .is_some_and(|online| online.eq_ignore_ascii_case(name))
        })
    }

    fn cast_command(session: &Arc<ProtocolSession>, args: &str) {
        let mut words = args.split_whitespace();
        let reply = match words.next() {
            Some("on") => match session.start_live_cast(words.next().unwrap_or("")) {
                Ok(()) => "Your live cast has started.".to_string(),
                Err(e) => e.to_string(),
            },
            Some("off") => match session.stop_live_cast() {
                Ok(()) => "Your live cast has ended.".to_string(),
                Err(e) => e.to_string(),
            },
            _ if session.is_live_caster() => format!(
                "You are casting to {} spectators.",
                session.live_cast().viewers()
            ),
            _ => "You are not casting. Use !cast on [password].".to_string(),
        };
        notify(session, reply);
    }
}

impl Default for LobbyWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments of a `!cast` command, or `None` if `text` is not one.
fn cast_command_args(text: &str) -> Option<&str> {
    let args = text.strip_prefix(CAST_COMMAND)?;
    (args.is_empty() || args.starts_with(char::is_whitespace)).then_some(args)
}

fn notify(session: &ProtocolSession, text: impl Into<String>) {
    session.send_text_message(&TextMessage::new(MessageClass::InfoDescription, text));
}

impl GameWorld for LobbyWorld {
    fn player_login(&mut self, request: LoginRequest, session: Arc<ProtocolSession>) {
        let name = request.character_name.trim();
        if name.is_empty() {
            session.on_login_rejected("You must enter a character name.");
            return;
        }
        if self.find_by_name(name).is_some() {
            session.on_login_rejected("You are already logged in.");
            return;
        }

        let player = PlayerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(FIRST_PLAYER_ID);
        if !session.on_login_accepted(player, name) {
            // The client left while the login was queued.
            return;
        }

        self.players.insert(player, Arc::clone(&session));
        tracing::info!(player = player.0, %name, online = self.online(), "Player entered the lobby");
        notify(&session, format!("Welcome, {name}. {} players online.", self.online()));
    }

    fn player_logout(&mut self, player: PlayerId, forced: bool) {
        let Some(session) = self.players.remove(&player) else {
            return;
        };
        tracing::info!(player = player.0, forced, online = self.online(), "Player left the lobby");
        if !forced {
            session.disconnect_client("");
        }
    }

    fn player_connection_lost(&mut self, player: PlayerId) {
        if self.players.remove(&player).is_some() {
            tracing::info!(player = player.0, online = self.online(), "Player connection lost");
        }
    }

    fn player_say(&mut self, player: PlayerId, speech: Speech) {
        let Some(session) = self.players.get(&player) else {
            return;
        };
        if let Some(args) = cast_command_args(&speech.text) {
            Self::cast_command(session, args);
            return;
        }

        let speaker = session.player_name().unwrap_or_default();
        if speech.class.has_receiver() {
            let receiver = speech.receiver.as_deref().unwrap_or_default();
            match self.find_by_name(receiver) {
                Some(receiver) => receiver.send_private_message(speaker, speech.class, &speech.text),
                None => notify(session, "A player with this name is not online."),
            }
        } else if speech.class.has_channel() {
            for listener in self.players.values() {
                listener.send_channel_message(
                    speaker,
                    &speech.text,
                    speech.class,
                    speech.channel.unwrap_or_default(),
                );
            }
        } else {
            for listener in self.players.values() {
                listener.send_creature_say(speaker, speech.class, &speech.text, SPAWN);
            }
        }
    }

    fn player_request_channels(&mut self, player: PlayerId) {
        if let Some(session) = self.players.get(&player) {
            session.send_channels_dialog(&[(CAST_CHANNEL_ID, CAST_CHANNEL_NAME.to_string())]);
        }
    }

    fn player_open_channel(&mut self, player: PlayerId, channel: u16) {
        if let Some(session) = self.players.get(&player)
            && channel == CAST_CHANNEL_ID
        {
            session.send_open_channel(CAST_CHANNEL_ID, CAST_CHANNEL_NAME);
        }
    }
}
