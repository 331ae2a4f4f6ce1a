use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gameworld_net::{
    FrameConfig, GameServer, NetworkMessage, OutputMessage, Position, ServerConfig, SocketConfig,
    read_frame, write_frame,
};
use gameworld_protocol::opcodes::{client, server};
use gameworld_protocol::{
    CAST_CHANNEL_ID, Challenge, Dispatcher, DispatcherThread, GameProtocol, GameWorld,
    LiveCastRegistry, LiveCastSettings, LoginRequest, MemoryCastStore, PlayerId, ProtocolSession,
    ProtocolSettings, SessionContext, SpeakClass, Speech,
};
use tokio::net::{TcpListener, TcpStream};

/// Logs everyone in, starts a cast for characters named `Caster*` using the
/// login password, and echoes local speech back as creature speech.
#[derive(Default)]
struct EchoWorld {
    sessions: HashMap<PlayerId, Arc<ProtocolSession>>,
    next_id: u32,
}

impl GameWorld for EchoWorld {
    fn player_login(&mut self, request: LoginRequest, session: Arc<ProtocolSession>) {
        if request.character_name == "Banned" {
            session.on_login_rejected("Your character has been banished.");
            return;
        }
        self.next_id += 1;
        let id = PlayerId(self.next_id);
        if !session.on_login_accepted(id, request.character_name.clone()) {
            return;
        }
        if request.character_name.starts_with("Caster") {
            session.start_live_cast(&request.password).unwrap();
        }
        self.sessions.insert(id, session);
    }

    fn player_logout(&mut self, player: PlayerId, _forced: bool) {
        if let Some(session) = self.sessions.remove(&player) {
            session.disconnect_client("");
        }
    }

    fn player_connection_lost(&mut self, player: PlayerId) {
        self.sessions.remove(&player);
    }

    fn player_say(&mut self, player: PlayerId, speech: Speech) {
        if let Some(session) = self.sessions.get(&player) {
            let name = session.player_name().unwrap_or_default().to_string();
            session.send_creature_say(&name, speech.class, &speech.text, Position::new(100, 100, 7));
        }
    }
}

struct TestServer {
    addr: SocketAddr,
    context: Arc<SessionContext>,
    server: Arc<GameServer>,
    _dispatcher: DispatcherThread,
}

async fn start_server() -> TestServer {
    let (dispatcher, thread) = Dispatcher::spawn(EchoWorld::default()).unwrap();
    let registry = Arc::new(LiveCastRegistry::new(127, Arc::new(MemoryCastStore::new())).unwrap());
    let context = Arc::new(SessionContext::new(
        ProtocolSettings::default(),
        LiveCastSettings::default(),
        registry,
        dispatcher,
    ));

    let server = Arc::new(GameServer::new(ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_connections: 64,
        socket: SocketConfig::default(),
    }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(GameProtocol::new(Arc::clone(&context)));
    let srv = Arc::clone(&server);
    tokio::spawn(async move {
        srv.run_with_listener(listener, handler).await.unwrap();
    });

    TestServer {
        addr,
        context,
        server,
        _dispatcher: thread,
    }
}

async fn recv(stream: &mut TcpStream) -> Option<Vec<u8>> {
    tokio::time::timeout(Duration::from_secs(5), read_frame(stream, &FrameConfig::default()))
        .await
        .expect("timed out waiting for a frame")
        .ok()
}

/// Skip frames until one starts with `opcode`; the cursor sits past it.
async fn recv_opcode(stream: &mut TcpStream, opcode: u8) -> NetworkMessage {
    loop {
        let frame = recv(stream).await.expect("connection closed");
        if frame.first() == Some(&opcode) {
            let mut msg = NetworkMessage::new(frame);
            msg.get_byte().unwrap();
            return msg;
        }
    }
}

async fn send(stream: &mut TcpStream, msg: OutputMessage) {
    write_frame(stream, msg.as_bytes(), &FrameConfig::default())
        .await
        .unwrap();
}

async fn connect_and_login(
    addr: SocketAddr,
    version: u16,
    account: &str,
    character: &str,
    password: &str,
) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut greeting = recv_opcode(&mut stream, server::CHALLENGE).await;
    let challenge = Challenge {
        timestamp: greeting.get_u32().unwrap(),
        random: greeting.get_byte().unwrap(),
    };

    let mut login = OutputMessage::new();
    login.add_u16(2);
    login.add_u16(version);
    login.add_string(account);
    login.add_string(character);
    login.add_string(password);
    login.add_u32(challenge.timestamp);
    login.add_byte(challenge.random);
    send(&mut stream, login).await;
    stream
}

async fn expect_disconnect(stream: &mut TcpStream) -> String {
    let mut msg = recv_opcode(stream, server::DISCONNECT).await;
    msg.get_string().unwrap()
}

fn cast_chat(text: &str) -> OutputMessage {
    let mut msg = OutputMessage::with_opcode(client::SAY);
    msg.add_byte(SpeakClass::ChannelYellow as u8);
    msg.add_u16(CAST_CHANNEL_ID);
    msg.add_string(text);
    msg
}

#[tokio::test]
async fn test_player_login_and_logout() {
    let server = start_server().await;
    let mut player = connect_and_login(server.addr, 1098, "acc", "Knight", "pw").await;
    let mut success = recv_opcode(&mut player, server::LOGIN_SUCCESS).await;
    assert_eq!(success.get_u32().unwrap(), 1);

    send(&mut player, OutputMessage::with_opcode(client::LOGOUT)).await;
    assert!(recv(&mut player).await.is_none(), "logout closes the socket");
}

#[tokio::test]
async fn test_rejections_reach_the_client() {
    let server = start_server().await;

    let mut old = connect_and_login(server.addr, 860, "acc", "Knight", "pw").await;
    assert_eq!(
        expect_disconnect(&mut old).await,
        "Only clients with protocol 10.98 allowed!"
    );

    let mut banned = connect_and_login(server.addr, 1098, "acc", "Banned", "pw").await;
    assert_eq!(
        expect_disconnect(&mut banned).await,
        "Your character has been banished."
    );

    let mut lost = connect_and_login(server.addr, 1098, "", "Nobody", "").await;
    assert_eq!(expect_disconnect(&mut lost).await, "This player is not casting.");
}

#[tokio::test]
async fn test_spectator_watches_and_chats() {
    let server = start_server().await;
    let mut caster = connect_and_login(server.addr, 1098, "acc", "Caster", "").await;
    recv_opcode(&mut caster, server::LOGIN_SUCCESS).await;
    let mut channel = recv_opcode(&mut caster, server::OPEN_CHANNEL).await;
    assert_eq!(channel.get_u16().unwrap(), CAST_CHANNEL_ID);

    let mut spectator = connect_and_login(server.addr, 1098, "", "caster", "").await;
    let mut success = recv_opcode(&mut spectator, server::LOGIN_SUCCESS).await;
    assert_eq!(success.get_u32().unwrap(), 1, "spectator sees the caster's id");
    recv_opcode(&mut spectator, server::OPEN_CHANNEL).await;

    // Caster speech is mirrored.
    let mut say = OutputMessage::with_opcode(client::SAY);
    say.add_byte(SpeakClass::Say as u8);
    say.add_string("hello viewers");
    send(&mut caster, say).await;
    recv_opcode(&mut caster, server::CREATURE_SAY).await;
    let mut mirrored = recv_opcode(&mut spectator, server::CREATURE_SAY).await;
    mirrored.skip_bytes(4).unwrap();
    assert_eq!(mirrored.get_string().unwrap(), "Caster");

    // Spectator chat reaches the caster on the cast channel.
    send(&mut spectator, cast_chat("nice play")).await;
    let mut relayed = recv_opcode(&mut caster, server::CREATURE_SAY).await;
    relayed.skip_bytes(4).unwrap();
    assert!(relayed.get_string().unwrap().starts_with("Spectator "));
    relayed.skip_bytes(3).unwrap();
    assert_eq!(relayed.get_u16().unwrap(), CAST_CHANNEL_ID);
    assert_eq!(relayed.get_string().unwrap(), "nice play");

    assert_eq!(server.context.registry.casts()[0].viewers, 1);
}

#[tokio::test]
async fn test_protected_cast_requires_password() {
    let server = start_server().await;
    let mut caster = connect_and_login(server.addr, 1098, "acc", "CasterLocked", "letmein").await;
    recv_opcode(&mut caster, server::OPEN_CHANNEL).await;

    let mut wrong = connect_and_login(server.addr, 1098, "", "CasterLocked", "guess").await;
    assert_eq!(expect_disconnect(&mut wrong).await, "Wrong cast password.");

    let mut right = connect_and_login(server.addr, 1098, "", "CasterLocked", "letmein").await;
    recv_opcode(&mut right, server::LOGIN_SUCCESS).await;
}

#[tokio::test]
async fn test_caster_disconnect_ends_cast_for_spectators() {
    let server = start_server().await;
    let mut caster = connect_and_login(server.addr, 1098, "acc", "Caster", "").await;
    recv_opcode(&mut caster, server::OPEN_CHANNEL).await;

    let mut spectator = connect_and_login(server.addr, 1098, "", "Caster", "").await;
    recv_opcode(&mut spectator, server::OPEN_CHANNEL).await;

    drop(caster);
    assert_eq!(
        expect_disconnect(&mut spectator).await,
        "The live cast has ended."
    );
    assert!(recv(&mut spectator).await.is_none());
    assert!(server.context.registry.is_empty());
}

#[tokio::test]
async fn test_shutdown_disconnects_players() {
    let server = start_server().await;
    let mut player = connect_and_login(server.addr, 1098, "acc", "Knight", "pw").await;
    recv_opcode(&mut player, server::LOGIN_SUCCESS).await;

    server.server.shutdown();
    assert_eq!(expect_disconnect(&mut player).await, "Server is shutting down.");
}
