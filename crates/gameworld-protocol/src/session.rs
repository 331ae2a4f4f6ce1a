//! Per-connection protocol session.
//!
//! A [`ProtocolSession`] moves through
//! `Connecting → Authenticating → Active → ClosingDown → Closed`. Every
//! termination path funnels into one transition to `ClosingDown`, so the
//! teardown (cast stop, game notification, socket close) runs exactly once no
//! matter how many threads ask for it.
//!
//! The session is shared between the connection's reader task, the game
//! executor thread and, while casting, the live-cast registry. All of its
//! methods take `&self`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use gameworld_net::{ConnectionId, NetworkMessage, OutputMessage, Position};
use tokio::sync::watch;

use crate::codec;
use crate::context::SessionContext;
use crate::error::{CastError, HandshakeError, ProtocolError};
use crate::game::GameWorld;
use crate::handshake::{Challenge, LoginPacket};
use crate::known_creatures::{KnownCreatures, Remembered};
use crate::lock;
use crate::outbox::{Frame, Outbox};
use crate::spectators::{BroadcastReport, LiveCast, SpectatorEndpoint};
use crate::text_message::TextMessage;
use crate::types::{
    CAST_CHANNEL_ID, CreatureId, CreatureSnapshot, Direction, ItemRef, OperatingSystem, Outfit,
    PlayerId, SpeakClass,
};

/// Name of the cast chat channel as shown in the client.
pub const CAST_CHANNEL_NAME: &str = "Live Cast";

/// Lifecycle of a session. Ordering follows the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Challenge sent, waiting for the login packet.
    Connecting,
    /// Login packet accepted, waiting for the game's verdict.
    Authenticating,
    /// Player in game; packets are dispatched.
    Active,
    /// Teardown running or done, writer draining.
    ClosingDown,
    /// Socket closed.
    Closed,
}

/// What the connection should do after the first message.
#[derive(Debug)]
pub enum Handshake {
    /// Player login queued on the game executor.
    Player,
    /// Spectator login. The session is spent; the connection serves the
    /// spectator on the same output queue.
    Spectator(LoginPacket),
    /// Refused. The client was told why and the socket is closing.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct ClientInfo {
    version: u16,
    operating_system: OperatingSystem,
}

#[derive(Debug)]
struct Identity {
    player: PlayerId,
    name: String,
}

/// One client connection speaking the game protocol.
pub struct ProtocolSession {
    id: ConnectionId,
    context: Arc<SessionContext>,
    outbox: Outbox,
    state: watch::Sender<SessionState>,
    challenge: Challenge,
    client: OnceLock<ClientInfo>,
    identity: OnceLock<Identity>,
    known_creatures: Mutex<KnownCreatures>,
    cast: LiveCast,
    violations: AtomicU32,
    logged_out: AtomicBool,
}

impl ProtocolSession {
    pub fn new(id: ConnectionId, context: Arc<SessionContext>, outbox: Outbox) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Connecting);
        let known_creatures = KnownCreatures::new(context.settings.known_creature_capacity);
        let cast = LiveCast::new(
            context.cast_settings.max_spectators,
            context.settings.known_creature_capacity,
        );
        Arc::new(Self {
            id,
            context,
            outbox,
            state,
            challenge: Challenge::generate(),
            client: OnceLock::new(),
            identity: OnceLock::new(),
            known_creatures: Mutex::new(known_creatures),
            cast,
            violations: AtomicU32::new(0),
            logged_out: AtomicBool::new(false),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn challenge(&self) -> Challenge {
        self.challenge
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.identity.get().map(|identity| identity.player)
    }

    pub fn player_name(&self) -> Option<&str> {
        self.identity.get().map(|identity| identity.name.as_str())
    }

    pub fn version(&self) -> Option<u16> {
        self.client.get().map(|client| client.version)
    }

    pub fn operating_system(&self) -> Option<OperatingSystem> {
        self.client.get().map(|client| client.operating_system)
    }

    pub fn live_cast(&self) -> &LiveCast {
        &self.cast
    }

    pub fn is_live_caster(&self) -> bool {
        self.cast.is_casting()
    }

    pub fn knows_creature(&self, id: CreatureId) -> bool {
        lock(&self.known_creatures).contains(id)
    }

    pub fn known_creature_count(&self) -> usize {
        lock(&self.known_creatures).len()
    }

    /// Malformed packets received so far.
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Greet a fresh connection with the login challenge.
    pub fn on_connect(&self) {
        let msg = codec::challenge(self.challenge.timestamp, self.challenge.random);
        self.write_to_output_buffer(msg, false);
    }

    /// Decode and vet the login packet.
    ///
    /// Player logins are queued on the game executor, which answers with
    /// [`on_login_accepted`](Self::on_login_accepted) or
    /// [`on_login_rejected`](Self::on_login_rejected).
    pub fn on_recv_first_message(self: &Arc<Self>, mut msg: NetworkMessage) -> Handshake {
        if !self.transition(&[SessionState::Connecting], SessionState::Authenticating) {
            return Handshake::Rejected;
        }

        let packet = match LoginPacket::parse(&mut msg) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(connection = self.id.0, "Malformed login packet: {e}");
                self.disconnect_client(&HandshakeError::Malformed(e).to_string());
                return Handshake::Rejected;
            }
        };
        if let Err(e) = packet.validate(&self.challenge, &self.context.settings) {
            tracing::info!(connection = self.id.0, version = packet.version, "Login refused: {e}");
            self.disconnect_client(&e.to_string());
            return Handshake::Rejected;
        }

        if packet.is_spectator() {
            if !self.context.cast_settings.enabled {
                self.disconnect_client(&HandshakeError::CastsDisabled.to_string());
                return Handshake::Rejected;
            }
            // The output queue now belongs to the spectator.
            self.transition(&[SessionState::Authenticating], SessionState::Closed);
            return Handshake::Spectator(packet);
        }

        let _ = self.client.set(ClientInfo {
            version: packet.version,
            operating_system: packet.operating_system,
        });
        let request = packet.into_request();
        let session = Arc::clone(self);
        if !self
            .context
            .dispatcher
            .add_task(move |game| game.player_login(request, session))
        {
            self.disconnect_client("Server is shutting down.");
            return Handshake::Rejected;
        }
        Handshake::Player
    }

    /// The game placed the player. Returns `false` if the connection went away
    /// in the meantime; the game should then drop the player again.
    pub fn on_login_accepted(&self, player: PlayerId, name: impl Into<String>) -> bool {
        if self.state() != SessionState::Authenticating {
            return false;
        }
        let name = name.into();
        if self
            .identity
            .set(Identity {
                player,
                name: name.clone(),
            })
            .is_err()
        {
            return false;
        }
        if !self.transition(&[SessionState::Authenticating], SessionState::Active) {
            return false;
        }
        self.write_to_output_buffer(codec::login_success(player), false);
        tracing::info!(connection = self.id.0, player = %player, name = %name, "Player logged in");
        true
    }

    /// The game refused the login.
    pub fn on_login_rejected(&self, reason: &str) {
        self.disconnect_client(reason);
    }

    /// Dispatch one packet of an active session.
    ///
    /// Empty frames are keepalives. Unknown opcodes are logged and dropped;
    /// malformed packets count towards the violation threshold.
    pub fn parse_packet(&self, mut msg: NetworkMessage) {
        if self.state() != SessionState::Active || msg.remaining() == 0 {
            return;
        }
        let Ok(opcode) = msg.get_byte() else {
            return;
        };
        match self.context.opcodes.get(opcode) {
            Some(handler) => {
                if let Err(e) = handler(self, &mut msg) {
                    self.record_violation(opcode, &e);
                }
            }
            None => {
                tracing::debug!(connection = self.id.0, "Unknown opcode {opcode:#04x}");
            }
        }
    }

    fn record_violation(&self, opcode: u8, error: &ProtocolError) {
        let count = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            connection = self.id.0,
            count,
            "Discarded packet {opcode:#04x}: {error}"
        );
        if count > self.context.settings.violation_threshold {
            self.disconnect_client("Too many invalid packets.");
        }
    }

    /// Queue game work on behalf of this session's player. Does nothing
    /// before login.
    pub fn add_game_task<F>(&self, task: F)
    where
        F: FnOnce(&mut dyn GameWorld, PlayerId) + Send + 'static,
    {
        let Some(player) = self.player_id() else {
            return;
        };
        if !self.context.dispatcher.add_task(move |game| task(game, player)) {
            tracing::warn!(connection = self.id.0, "Game executor stopped, dropping request");
        }
    }

    /// Ask the game to log the player out. A forced logout does not wait for
    /// the game's consent and closes the connection at once.
    pub fn logout(&self, forced: bool) {
        if self.player_id().is_none() {
            self.disconnect_client("");
            return;
        }
        if forced {
            self.logged_out.store(true, Ordering::Release);
        }
        self.add_game_task(move |game, player| game.player_logout(player, forced));
        if forced {
            self.disconnect_client("");
        }
    }

    /// Close the connection, first showing `reason` if it is non-empty.
    pub fn disconnect_client(&self, reason: &str) {
        self.close(Some(reason));
    }

    /// Close the connection silently.
    pub fn release(&self) {
        self.close(None);
    }

    /// Single teardown path.
    ///
    /// The cast is unregistered before anything else is released, so once
    /// this returns no broadcast or registry lookup sees the session casting.
    fn close(&self, reason: Option<&str>) {
        let open = [
            SessionState::Connecting,
            SessionState::Authenticating,
            SessionState::Active,
        ];
        if !self.transition(&open, SessionState::ClosingDown) {
            return;
        }

        if let Some(reason) = reason.filter(|reason| !reason.is_empty()) {
            let _ = self.outbox.send(into_frame(codec::disconnect(reason)));
        }

        if let Some(player) = self.player_id() {
            // Serialised with registration on the registry lock.
            let _ = self.context.registry.unregister(self);
            if !self.logged_out.load(Ordering::Acquire) {
                self.context
                    .dispatcher
                    .add_task(move |game| game.player_connection_lost(player));
            }
        }

        self.outbox.close();
        tracing::debug!(connection = self.id.0, "Session closing");
    }

    /// The writer flushed everything and the socket is closed.
    pub fn on_output_drained(&self) {
        self.transition(&[SessionState::ClosingDown], SessionState::Closed);
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// Queue a packet for this client and, if `broadcast` is set and the
    /// player is casting, for every spectator.
    pub fn write_to_output_buffer(&self, msg: OutputMessage, broadcast: bool) {
        if self.state() >= SessionState::ClosingDown {
            return;
        }
        let frame = into_frame(msg);
        if broadcast && self.cast.is_casting() {
            let report = self.cast.broadcast(&frame);
            self.note_dropped_spectators(&report);
        }
        self.queue(frame);
    }

    fn queue(&self, frame: Frame) {
        if self.outbox.send(frame).is_err() {
            tracing::trace!(connection = self.id.0, "Output queue closed, packet dropped");
        }
    }

    fn note_dropped_spectators(&self, report: &BroadcastReport) {
        if report.dropped.is_empty() {
            return;
        }
        tracing::debug!(
            connection = self.id.0,
            dropped = report.dropped.len(),
            "Dropped unreachable spectators"
        );
        self.context.registry.publish(self);
    }

    pub fn send_ping(&self) {
        self.write_to_output_buffer(codec::ping(), false);
    }

    pub fn send_ping_back(&self) {
        self.write_to_output_buffer(codec::ping_back(), false);
    }

    /// Place a creature on a tile, describing it in full unless the client
    /// already knows it.
    ///
    /// The caster and each spectator are rendered against their own cache.
    pub fn send_add_creature(&self, creature: &CreatureSnapshot, position: Position, stack_pos: u8) {
        if self.state() >= SessionState::ClosingDown {
            return;
        }
        let render = |outcome: Remembered| {
            let (known, remove) = match outcome {
                Remembered::AlreadyKnown => (true, None),
                Remembered::Added => (false, None),
                Remembered::Replaced { evicted } => (false, Some(evicted)),
            };
            into_frame(codec::add_tile_creature(position, stack_pos, creature, known, remove))
        };
        let own = render(lock(&self.known_creatures).remember(creature.id));
        if self.cast.is_casting() {
            let report = self.cast.broadcast_creature(creature.id, render);
            self.note_dropped_spectators(&report);
        }
        self.queue(own);
    }

    pub fn send_remove_creature(&self, position: Position, stack_pos: u8) {
        self.write_to_output_buffer(codec::remove_tile_thing(position, stack_pos), true);
    }

    /// The creature was destroyed; the client will never see it again.
    pub fn forget_creature(&self, id: CreatureId) -> bool {
        self.cast.forget_creature(id);
        lock(&self.known_creatures).forget(id)
    }

    pub fn send_creature_turn(
        &self,
        creature: CreatureId,
        position: Position,
        stack_pos: u8,
        direction: Direction,
        walkthrough: bool,
    ) {
        let msg = codec::creature_turn(creature, position, stack_pos, direction, walkthrough);
        self.write_to_output_buffer(msg, true);
    }

    pub fn send_creature_health(&self, creature: CreatureId, health_percent: u8) {
        self.write_to_output_buffer(codec::creature_health(creature, health_percent), true);
    }

    pub fn send_creature_outfit(&self, creature: CreatureId, outfit: &Outfit) {
        self.write_to_output_buffer(codec::creature_outfit(creature, outfit), true);
    }

    pub fn send_change_speed(&self, creature: CreatureId, base_speed: u16, speed: u16) {
        self.write_to_output_buffer(codec::change_speed(creature, base_speed, speed), true);
    }

    pub fn send_creature_say(&self, speaker: &str, class: SpeakClass, text: &str, position: Position) {
        self.write_to_output_buffer(codec::creature_say(speaker, class, text, position), true);
    }

    /// Channel chat. Only the cast channel is mirrored to spectators.
    pub fn send_channel_message(&self, author: &str, text: &str, class: SpeakClass, channel: u16) {
        let msg = codec::channel_message(author, text, class, channel);
        self.write_to_output_buffer(msg, channel == CAST_CHANNEL_ID);
    }

    pub fn send_private_message(&self, speaker: &str, class: SpeakClass, text: &str) {
        self.write_to_output_buffer(codec::private_message(speaker, class, text), false);
    }

    pub fn send_text_message(&self, message: &TextMessage) {
        self.write_to_output_buffer(codec::text_message(message), false);
    }

    pub fn send_channels_dialog(&self, channels: &[(u16, String)]) {
        self.write_to_output_buffer(codec::channels_dialog(channels), false);
    }

    pub fn send_open_channel(&self, channel: u16, name: &str) {
        self.write_to_output_buffer(codec::open_channel(channel, name), false);
    }

    pub fn send_inventory_item(&self, slot: u8, item: Option<&ItemRef>) {
        self.write_to_output_buffer(codec::inventory_item(slot, item), false);
    }

    pub fn send_trade_item_request(&self, trader: &str, items: &[ItemRef], own: bool) {
        self.write_to_output_buffer(codec::trade_item_request(trader, items, own), false);
    }

    pub fn send_close_trade(&self) {
        self.write_to_output_buffer(codec::close_trade(), false);
    }

    pub fn send_market_leave(&self) {
        self.write_to_output_buffer(codec::market_leave(), false);
    }

    /// Only OTClient builds understand extended opcodes.
    pub fn send_extended_opcode(&self, opcode: u8, buffer: &str) {
        if self.operating_system().is_some_and(|os| os.is_otclient()) {
            self.write_to_output_buffer(codec::extended_opcode(opcode, buffer), false);
        }
    }

    // -----------------------------------------------------------------------
    // Live casting
    // -----------------------------------------------------------------------

    /// Start casting under the player's name. An empty password makes the
    /// cast public.
    pub fn start_live_cast(self: &Arc<Self>, password: &str) -> Result<(), CastError> {
        if !self.context.cast_settings.enabled {
            return Err(CastError::Disabled);
        }
        self.context.registry.register(self, password)?;
        self.send_open_channel(CAST_CHANNEL_ID, CAST_CHANNEL_NAME);
        Ok(())
    }

    /// Stop casting and disconnect every spectator.
    pub fn stop_live_cast(&self) -> Result<(), CastError> {
        self.context.registry.unregister(self)
    }

    /// Admit a spectator, queuing `greeting` to it first. Returns the new
    /// audience size.
    pub fn add_spectator(
        &self,
        spectator: Arc<dyn SpectatorEndpoint>,
        password: &str,
        greeting: &[Frame],
    ) -> Result<u8, CastError> {
        let viewers = self.cast.add(spectator, password, greeting)?;
        self.context.registry.publish(self);
        Ok(viewers)
    }

    pub fn remove_spectator(&self, id: ConnectionId) -> bool {
        let removed = self.cast.remove(id);
        if removed {
            self.context.registry.publish(self);
        }
        removed
    }

    /// Relay a spectator's chat line to the caster and the whole audience.
    pub fn forward_chat_from_spectator(&self, spectator: &str, text: &str) -> bool {
        if self.state() != SessionState::Active || !self.is_live_caster() {
            return false;
        }
        self.send_channel_message(spectator, text, SpeakClass::ChannelYellow, CAST_CHANNEL_ID);
        true
    }

    /// Relay the caster's own chat line to the audience, authored by the cast
    /// name.
    pub fn forward_chat_to_spectators(&self, text: &str) -> bool {
        let Some(name) = self.player_name() else {
            return false;
        };
        if !self.is_live_caster() {
            return false;
        }
        self.send_channel_message(name, text, SpeakClass::ChannelYellow, CAST_CHANNEL_ID);
        true
    }
}

pub(crate) fn into_frame(msg: OutputMessage) -> Frame {
    Arc::from(msg.into_bytes())
}
