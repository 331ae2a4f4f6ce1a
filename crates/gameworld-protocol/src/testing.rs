//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use gameworld_net::{ConnectionId, NetworkMessage};

use crate::cast_store::{CastInfo, CastInfoStore, MemoryCastStore};
use crate::context::SessionContext;
use crate::error::SendError;
use crate::executor::{Dispatcher, DispatcherThread};
use crate::game::{GameWorld, LoginRequest};
use crate::handshake::encode_login;
use crate::live_cast::LiveCastRegistry;
use crate::outbox::{Frame, OutboxReceiver, outbox};
use crate::session::ProtocolSession;
use crate::settings::{LiveCastSettings, ProtocolSettings};
use crate::spectators::SpectatorEndpoint;
use crate::types::{Direction, PlayerId, Speech};

/// Game calls observed by [`RecordingWorld`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorldEvent {
    Login(String),
    Logout(PlayerId, bool),
    ConnectionLost(PlayerId),
    Walk(PlayerId, Direction),
    Say(PlayerId, String),
}

struct RecordingWorld {
    events: Arc<Mutex<Vec<WorldEvent>>>,
}

impl RecordingWorld {
    fn record(&self, event: WorldEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl GameWorld for RecordingWorld {
    fn player_login(&mut self, request: LoginRequest, _session: Arc<ProtocolSession>) {
        self.record(WorldEvent::Login(request.character_name));
    }

    fn player_logout(&mut self, player: PlayerId, forced: bool) {
        self.record(WorldEvent::Logout(player, forced));
    }

    fn player_connection_lost(&mut self, player: PlayerId) {
        self.record(WorldEvent::ConnectionLost(player));
    }

    fn player_walk(&mut self, player: PlayerId, direction: Direction) {
        self.record(WorldEvent::Walk(player, direction));
    }

    fn player_say(&mut self, player: PlayerId, speech: Speech) {
        self.record(WorldEvent::Say(player, speech.text));
    }
}

/// A context wired to a recording world and an in-memory cast store.
pub(crate) struct TestHarness {
    context: Arc<SessionContext>,
    store: Arc<MemoryCastStore>,
    events: Arc<Mutex<Vec<WorldEvent>>>,
    next_connection: AtomicU64,
    _thread: DispatcherThread,
}

impl TestHarness {
    pub(crate) fn new() -> Self {
        Self::with_cast_settings(LiveCastSettings::default())
    }

    pub(crate) fn with_limits(max_casts: u8, max_spectators: u8) -> Self {
        Self::with_cast_settings(LiveCastSettings {
            max_casts,
            max_spectators,
            ..Default::default()
        })
    }

    pub(crate) fn with_cast_settings(cast_settings: LiveCastSettings) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let world = RecordingWorld {
            events: Arc::clone(&events),
        };
        let (dispatcher, thread) = Dispatcher::spawn(world).unwrap();
        let store = Arc::new(MemoryCastStore::new());
        let shared: Arc<dyn CastInfoStore> = store.clone();
        let registry = Arc::new(LiveCastRegistry::new(cast_settings.max_casts, shared).unwrap());
        let context = Arc::new(SessionContext::new(
            ProtocolSettings::default(),
            cast_settings,
            registry,
            dispatcher,
        ));
        Self {
            context,
            store,
            events,
            next_connection: AtomicU64::new(1),
            _thread: thread,
        }
    }

    pub(crate) fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub(crate) fn registry(&self) -> &Arc<LiveCastRegistry> {
        &self.context.registry
    }

    /// Rows in the cast store once every queued write has landed.
    pub(crate) fn stored_casts(&self) -> Vec<CastInfo> {
        assert!(self.registry().flush_store());
        self.store.list().unwrap()
    }

    /// Session in `Connecting`, with the receiving end of its output.
    pub(crate) fn fresh_session(&self) -> (Arc<ProtocolSession>, OutboxReceiver) {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = outbox();
        (ProtocolSession::new(id, Arc::clone(&self.context), tx), rx)
    }

    pub(crate) fn connecting_session(&self) -> Arc<ProtocolSession> {
        self.fresh_session().0
    }

    /// Session logged in as `name`, with login traffic and events cleared.
    pub(crate) fn active_session(&self, id: u32, name: &str) -> (Arc<ProtocolSession>, OutboxReceiver) {
        let (session, mut rx) = self.fresh_session();
        let login = encode_login(1098, "account", name, "password", session.challenge());
        session.on_recv_first_message(NetworkMessage::new(login));
        self.settle();
        assert!(session.on_login_accepted(PlayerId(id), name));
        self.events.lock().unwrap().clear();
        rx.drain_frames();
        (session, rx)
    }

    /// Wait for every queued game task.
    pub(crate) fn settle(&self) {
        assert!(self.context.dispatcher.barrier());
    }

    pub(crate) fn events(&self) -> Vec<WorldEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Spectator endpoint that records what it is sent.
pub(crate) struct FakeSpectator {
    id: ConnectionId,
    name: String,
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl FakeSpectator {
    pub(crate) fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId(id),
            name: format!("Spectator {id}"),
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub(crate) fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SpectatorEndpoint for FakeSpectator {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, frame: Frame) -> Result<(), SendError> {
        if self.failing.load(Ordering::SeqCst) || self.is_closed() {
            return Err(SendError::Closed);
        }
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
