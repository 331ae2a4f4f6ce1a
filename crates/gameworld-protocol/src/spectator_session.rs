//! Connections that watch a cast instead of playing.
//!
//! A spectator receives the caster's mirrored traffic and may only chat on
//! the cast channel, ping, and leave. Everything else it sends is ignored.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use gameworld_net::{ConnectionId, MessageError, NetworkMessage};

use crate::codec;
use crate::context::SessionContext;
use crate::error::{CastError, SendError};
use crate::handshake::LoginPacket;
use crate::lock;
use crate::opcodes::client;
use crate::outbox::{Frame, Outbox};
use crate::session::{CAST_CHANNEL_NAME, ProtocolSession, into_frame};
use crate::spectators::SpectatorEndpoint;
use crate::text_message::{MessageClass, TextMessage};
use crate::types::{CAST_CHANNEL_ID, PlayerId, SpeakClass};

/// Sliding-window limit on spectator chat.
#[derive(Debug, Clone)]
pub struct ChatThrottle {
    timestamps: VecDeque<Instant>,
    max_count: u32,
    window: Duration,
}

impl ChatThrottle {
    pub fn new(max_count: u32, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            max_count,
            window,
        }
    }

    /// Records `now` and returns `true` if the spectator is within the limit.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        while self
            .timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.window)
        {
            self.timestamps.pop_front();
        }
        if self.timestamps.len() as u32 >= self.max_count {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }
}

/// One spectator watching one cast.
pub struct SpectatorConnection {
    id: ConnectionId,
    name: String,
    outbox: Outbox,
    caster: Weak<ProtocolSession>,
    throttle: Mutex<ChatThrottle>,
    max_message_length: usize,
}

impl SpectatorConnection {
    /// Join the cast named by the login packet's character name.
    ///
    /// The spectator is greeted as if logged in as the caster and has the
    /// cast channel opened before any mirrored packet reaches it.
    pub fn join(
        id: ConnectionId,
        outbox: Outbox,
        packet: &LoginPacket,
        context: &SessionContext,
    ) -> Result<Arc<Self>, CastError> {
        if !context.cast_settings.enabled {
            return Err(CastError::Disabled);
        }
        let caster = context
            .registry
            .lookup_by_name(&packet.character_name)
            .ok_or(CastError::NotCasting)?;
        let caster_id = caster.player_id().ok_or(CastError::NotCasting)?;
        let caster_name = caster.player_name().unwrap_or(&packet.character_name).to_string();

        let settings = &context.cast_settings;
        let spectator = Arc::new(Self {
            id,
            name: format!("Spectator {}", id.0),
            outbox,
            caster: Arc::downgrade(&caster),
            throttle: Mutex::new(ChatThrottle::new(settings.chat_messages, settings.chat_window)),
            max_message_length: settings.chat_max_length,
        });

        let greeting = greeting(caster_id, &caster_name);
        let viewers = caster.add_spectator(spectator.clone(), &packet.password, &greeting)?;
        tracing::info!(
            connection = id.0,
            cast = %caster_name,
            viewers,
            "Spectator joined"
        );
        Ok(spectator)
    }

    /// Handle one packet. Returns `false` once the spectator wants to leave.
    pub fn parse_packet(&self, mut msg: NetworkMessage) -> bool {
        let Ok(opcode) = msg.get_byte() else {
            return true;
        };
        match opcode {
            client::LOGOUT => false,
            client::PING => {
                let _ = self.outbox.send(into_frame(codec::ping_back()));
                true
            }
            client::SAY => {
                if let Err(e) = self.say(&mut msg) {
                    tracing::debug!(connection = self.id.0, "Discarded spectator chat: {e}");
                }
                true
            }
            _ => true,
        }
    }

    fn say(&self, msg: &mut NetworkMessage) -> Result<(), MessageError> {
        let Some(class) = SpeakClass::from_wire(msg.get_byte()?) else {
            return Ok(());
        };
        if class.has_receiver() {
            msg.get_string()?;
        }
        let channel = if class.has_channel() {
            Some(msg.get_u16()?)
        } else {
            None
        };
        let text = msg.get_string_limited(self.max_message_length)?;
        if channel != Some(CAST_CHANNEL_ID) || text.trim().is_empty() {
            return Ok(());
        }

        if !lock(&self.throttle).allow() {
            let notice = TextMessage::new(
                MessageClass::StatusSmall,
                "You are sending messages too fast.",
            );
            let _ = self.outbox.send(into_frame(codec::text_message(&notice)));
            return Ok(());
        }

        if let Some(caster) = self.caster.upgrade() {
            caster.forward_chat_from_spectator(&self.name, &text);
        }
        Ok(())
    }

    /// Leave the cast and close the connection.
    pub fn leave(&self) {
        if let Some(caster) = self.caster.upgrade()
            && caster.remove_spectator(self.id)
        {
            tracing::info!(connection = self.id.0, "Spectator left");
        }
        self.outbox.close();
    }

    /// Leave, showing `reason` first.
    pub fn disconnect(&self, reason: &str) {
        let _ = self.outbox.send(into_frame(codec::disconnect(reason)));
        self.leave();
    }
}

impl SpectatorEndpoint for SpectatorConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, frame: Frame) -> Result<(), SendError> {
        self.outbox.send(frame)
    }

    /// The cast ended.
    fn close(&self) {
        let _ = self
            .outbox
            .send(into_frame(codec::disconnect("The live cast has ended.")));
        self.outbox.close();
    }
}

fn greeting(caster: PlayerId, caster_name: &str) -> Vec<Frame> {
    let welcome = TextMessage::new(
        MessageClass::EventDefault,
        format!("You are watching {caster_name}'s live cast."),
    );
    vec![
        into_frame(codec::login_success(caster)),
        into_frame(codec::open_channel(CAST_CHANNEL_ID, CAST_CHANNEL_NAME)),
        into_frame(codec::text_message(&welcome)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Challenge;
    use crate::opcodes::server;
    use crate::outbox::{OutboxReceiver, outbox};
    use crate::testing::TestHarness;
    use crate::types::{CreatureId, OperatingSystem};
    use gameworld_net::OutputMessage;

    fn spectator_packet(cast: &str, password: &str) -> LoginPacket {
        LoginPacket {
            operating_system: OperatingSystem::Windows,
            version: 1098,
            account_name: String::new(),
            character_name: cast.to_string(),
            password: password.to_string(),
            challenge: Challenge {
                timestamp: 0,
                random: 0,
            },
        }
    }

    fn join(
        harness: &TestHarness,
        id: u64,
        cast: &str,
        password: &str,
    ) -> (Result<Arc<SpectatorConnection>, CastError>, OutboxReceiver) {
        let (tx, rx) = outbox();
        let result = SpectatorConnection::join(
            ConnectionId(id),
            tx,
            &spectator_packet(cast, password),
            harness.context(),
        );
        (result, rx)
    }

    fn cast_say(text: &str) -> NetworkMessage {
        let mut msg = OutputMessage::with_opcode(client::SAY);
        msg.add_byte(SpeakClass::ChannelYellow as u8);
        msg.add_u16(CAST_CHANNEL_ID);
        msg.add_string(text);
        NetworkMessage::new(msg.into_bytes())
    }

    #[test]
    fn test_throttle_window_slides() {
        let mut throttle = ChatThrottle::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(throttle.allow_at(start));
        assert!(throttle.allow_at(start + Duration::from_secs(1)));
        assert!(!throttle.allow_at(start + Duration::from_secs(2)));
        assert!(throttle.allow_at(start + Duration::from_secs(11)));
    }

    #[test]
    fn test_join_greets_then_mirrors() {
        let harness = TestHarness::new();
        let (caster, _out) = harness.active_session(7, "Knight");
        caster.start_live_cast("").unwrap();

        let (spectator, mut rx) = join(&harness, 500, "knight", "");
        assert!(spectator.is_ok());
        caster.send_creature_health(CreatureId(7), 40);

        let frames = rx.drain_frames();
        let opcodes: Vec<u8> = frames.iter().map(|frame| frame[0]).collect();
        assert_eq!(
            opcodes,
            vec![
                server::LOGIN_SUCCESS,
                server::OPEN_CHANNEL,
                server::TEXT_MESSAGE,
                server::CREATURE_HEALTH,
            ]
        );
        assert_eq!(caster.live_cast().viewers(), 1);
    }

    #[test]
    fn test_join_failures() {
        let harness = TestHarness::with_limits(10, 1);
        let (caster, _out) = harness.active_session(7, "Knight");

        assert_eq!(join(&harness, 500, "Knight", "").0.err(), Some(CastError::NotCasting));
        caster.start_live_cast("pw").unwrap();
        assert_eq!(
            join(&harness, 501, "Knight", "wrong").0.err(),
            Some(CastError::AuthenticationFailed)
        );
        let (first, _rx) = join(&harness, 502, "Knight", "pw");
        assert!(first.is_ok());
        assert_eq!(
            join(&harness, 503, "Knight", "pw").0.err(),
            Some(CastError::SpectatorLimitExceeded)
        );
        assert_eq!(caster.live_cast().viewers(), 1);
    }

    #[test]
    fn test_spectator_chat_reaches_caster_and_audience() {
        let harness = TestHarness::new();
        let (caster, mut caster_out) = harness.active_session(7, "Knight");
        caster.start_live_cast("").unwrap();
        caster_out.drain_frames();

        let (spectator, mut rx) = join(&harness, 500, "Knight", "");
        let spectator = spectator.unwrap();
        rx.drain_frames();

        assert!(spectator.parse_packet(cast_say("hello")));
        let to_caster = caster_out.drain_frames();
        assert_eq!(to_caster.len(), 1);
        let mut msg = NetworkMessage::new(to_caster[0].to_vec());
        msg.skip_bytes(5).unwrap();
        assert_eq!(msg.get_string().unwrap(), "Spectator 500");
        assert_eq!(rx.drain_frames().len(), 1);
    }

    #[test]
    fn test_spectator_chat_rate_limited() {
        let harness = TestHarness::with_cast_settings(crate::settings::LiveCastSettings {
            chat_messages: 1,
            ..Default::default()
        });
        let (caster, mut caster_out) = harness.active_session(7, "Knight");
        caster.start_live_cast("").unwrap();
        let (spectator, mut rx) = join(&harness, 500, "Knight", "");
        let spectator = spectator.unwrap();
        caster_out.drain_frames();
        rx.drain_frames();

        spectator.parse_packet(cast_say("one"));
        spectator.parse_packet(cast_say("two"));
        assert_eq!(caster_out.drain_frames().len(), 1);
        let frames = rx.drain_frames();
        assert_eq!(frames.last().unwrap()[0], server::TEXT_MESSAGE);
    }

    #[test]
    fn test_other_channels_and_opcodes_ignored() {
        let harness = TestHarness::new();
        let (caster, mut caster_out) = harness.active_session(7, "Knight");
        caster.start_live_cast("").unwrap();
        let (spectator, _rx) = join(&harness, 500, "Knight", "");
        let spectator = spectator.unwrap();
        caster_out.drain_frames();

        let mut say = OutputMessage::with_opcode(client::SAY);
        say.add_byte(SpeakClass::Say as u8);
        say.add_string("local");
        assert!(spectator.parse_packet(NetworkMessage::new(say.into_bytes())));
        assert!(spectator.parse_packet(NetworkMessage::new(vec![client::WALK_NORTH])));
        assert!(spectator.parse_packet(NetworkMessage::new(vec![])));
        harness.settle();

        assert!(caster_out.drain_frames().is_empty());
        assert!(harness.events().is_empty());
        assert!(!spectator.parse_packet(NetworkMessage::new(vec![client::LOGOUT])));
    }

    #[test]
    fn test_leave_and_cast_end() {
        let harness = TestHarness::new();
        let (caster, _out) = harness.active_session(7, "Knight");
        caster.start_live_cast("").unwrap();

        let (first, _rx1) = join(&harness, 500, "Knight", "");
        let (_second, mut rx2) = join(&harness, 501, "Knight", "");
        first.unwrap().leave();
        assert_eq!(caster.live_cast().viewers(), 1);

        caster.stop_live_cast().unwrap();
        let frames = rx2.drain_frames();
        let mut last = NetworkMessage::new(frames.last().unwrap().to_vec());
        assert_eq!(last.get_byte().unwrap(), server::DISCONNECT);
        assert_eq!(last.get_string().unwrap(), "The live cast has ended.");
    }
}
