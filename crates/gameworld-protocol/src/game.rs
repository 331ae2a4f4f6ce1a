//! The seam between protocol sessions and the game world.

use std::sync::Arc;

use gameworld_net::Position;

use crate::session::ProtocolSession;
use crate::types::{CreatureId, Direction, FightModes, OperatingSystem, Outfit, PlayerId, Speech};

/// Credentials and client details from a player's first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub account_name: String,
    pub character_name: String,
    pub password: String,
    pub operating_system: OperatingSystem,
    pub version: u16,
}

/// Game state mutated on the single executor thread.
///
/// Sessions never call these directly: every decoded packet becomes a task on
/// the [`Dispatcher`](crate::executor::Dispatcher), so implementations own
/// their world exclusively and need no locking. Replies go back through the
/// `send_*` methods of the player's [`ProtocolSession`], which are safe to
/// call from this thread.
///
/// Only login and logout are mandatory; every other request is ignored unless
/// the world overrides it.
pub trait GameWorld: Send + 'static {
    /// Authenticate and place the character. The world must answer with
    /// [`ProtocolSession::on_login_accepted`] or
    /// [`ProtocolSession::on_login_rejected`].
    fn player_login(&mut self, request: LoginRequest, session: Arc<ProtocolSession>);

    /// The player asked to leave, or is forced out. A voluntary logout the
    /// world accepts ends with [`ProtocolSession::disconnect_client`].
    fn player_logout(&mut self, player: PlayerId, forced: bool);

    /// The client vanished without logging out.
    fn player_connection_lost(&mut self, _player: PlayerId) {}

    fn player_walk(&mut self, _player: PlayerId, _direction: Direction) {}

    fn player_auto_walk(&mut self, _player: PlayerId, _path: Vec<Direction>) {}

    fn player_stop_walk(&mut self, _player: PlayerId) {}

    fn player_turn(&mut self, _player: PlayerId, _direction: Direction) {}

    fn player_say(&mut self, _player: PlayerId, _speech: Speech) {}

    fn player_set_fight_modes(&mut self, _player: PlayerId, _modes: FightModes) {}

    fn player_attack(&mut self, _player: PlayerId, _target: CreatureId) {}

    fn player_follow(&mut self, _player: PlayerId, _target: CreatureId) {}

    fn player_cancel_attack_and_follow(&mut self, _player: PlayerId) {}

    fn player_look_at(&mut self, _player: PlayerId, _position: Position, _item_id: u16, _stack_pos: u8) {}

    fn player_request_outfit(&mut self, _player: PlayerId) {}

    fn player_change_outfit(&mut self, _player: PlayerId, _outfit: Outfit) {}

    fn player_request_channels(&mut self, _player: PlayerId) {}

    fn player_open_channel(&mut self, _player: PlayerId, _channel: u16) {}

    fn player_close_channel(&mut self, _player: PlayerId, _channel: u16) {}

    fn player_receive_ping(&mut self, _player: PlayerId) {}

    /// OTClient extension packet.
    fn player_extended_opcode(&mut self, _player: PlayerId, _opcode: u8, _buffer: String) {}
}
