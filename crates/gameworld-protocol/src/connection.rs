//! Drives one TCP connection through the game protocol.
//!
//! Each connection gets a writer task draining its [`Outbox`] and a reader
//! loop feeding frames to a [`ProtocolSession`], or to a
//! [`SpectatorConnection`] if the login names a cast.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gameworld_net::{ConnectionHandler, ConnectionId, FrameError, NetworkMessage, read_frame};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::codec;
use crate::context::SessionContext;
use crate::handshake::LoginPacket;
use crate::outbox::{Outbox, outbox, run_writer};
use crate::session::{Handshake, ProtocolSession, SessionState, into_frame};
use crate::spectator_session::SpectatorConnection;

const SHUTDOWN_REASON: &str = "Server is shutting down.";
const TIMEOUT_REASON: &str = "Connection timed out.";

/// [`ConnectionHandler`] speaking the game protocol.
pub struct GameProtocol {
    context: Arc<SessionContext>,
}

impl GameProtocol {
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    async fn serve_player(
        &self,
        session: &Arc<ProtocolSession>,
        outbox: &Outbox,
        reader: &mut OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let settings = &self.context.settings;
        let pinger = {
            let session = Arc::clone(session);
            spawn_pinger(settings.ping_interval, move || match session.state() {
                SessionState::Active => {
                    session.send_ping();
                    true
                }
                state => state < SessionState::ClosingDown,
            })
        };

        loop {
            tokio::select! {
                frame = timeout(settings.session_timeout, read_frame(reader, &settings.frame)) => {
                    match frame {
                        Ok(Ok(payload)) => session.parse_packet(NetworkMessage::new(payload)),
                        Ok(Err(FrameError::ConnectionClosed)) => break,
                        Ok(Err(e)) => {
                            tracing::debug!(connection = session.id().0, "Read failed: {e}");
                            break;
                        }
                        Err(_) => {
                            tracing::info!(connection = session.id().0, "Idle timeout");
                            session.disconnect_client(TIMEOUT_REASON);
                            break;
                        }
                    }
                }
                _ = outbox.closed() => break,
                _ = shutdown_requested(&mut shutdown) => {
                    session.disconnect_client(SHUTDOWN_REASON);
                    break;
                }
            }
        }

        pinger.abort();
    }

    async fn serve_spectator(
        &self,
        id: ConnectionId,
        packet: LoginPacket,
        outbox: &Outbox,
        reader: &mut OwnedReadHalf,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let spectator = match SpectatorConnection::join(id, outbox.clone(), &packet, &self.context) {
            Ok(spectator) => spectator,
            Err(e) => {
                tracing::info!(connection = id.0, cast = %packet.character_name, "Spectator refused: {e}");
                let _ = outbox.send(into_frame(codec::disconnect(&e.to_string())));
                outbox.close();
                return;
            }
        };

        let settings = &self.context.settings;
        let pinger = {
            let outbox = outbox.clone();
            spawn_pinger(settings.ping_interval, move || {
                outbox.send(into_frame(codec::ping())).is_ok()
            })
        };

        loop {
            tokio::select! {
                frame = timeout(settings.session_timeout, read_frame(reader, &settings.frame)) => {
                    match frame {
                        Ok(Ok(payload)) => {
                            if !spectator.parse_packet(NetworkMessage::new(payload)) {
                                break;
                            }
                        }
                        Ok(Err(_)) => break,
                        Err(_) => {
                            spectator.disconnect(TIMEOUT_REASON);
                            break;
                        }
                    }
                }
                _ = outbox.closed() => break,
                _ = shutdown_requested(&mut shutdown) => {
                    spectator.disconnect(SHUTDOWN_REASON);
                    break;
                }
            }
        }

        pinger.abort();
        spectator.leave();
    }
}

impl ConnectionHandler for GameProtocol {
    async fn handle(
        self: Arc<Self>,
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let settings = &self.context.settings;
        let (mut reader, writer) = stream.into_split();
        let (outbox, queue) = outbox();
        let writer = tokio::spawn(run_writer(writer, queue, settings.frame.clone()));

        let session = ProtocolSession::new(id, Arc::clone(&self.context), outbox.clone());
        session.on_connect();
        tracing::debug!(connection = id.0, %peer, "Challenge sent");

        let handshake = tokio::select! {
            first = timeout(settings.session_timeout, read_frame(&mut reader, &settings.frame)) => {
                match first {
                    Ok(Ok(payload)) => session.on_recv_first_message(NetworkMessage::new(payload)),
                    Ok(Err(e)) => {
                        tracing::debug!(connection = id.0, "Closed before login: {e}");
                        session.release();
                        Handshake::Rejected
                    }
                    Err(_) => {
                        session.disconnect_client(TIMEOUT_REASON);
                        Handshake::Rejected
                    }
                }
            }
            _ = shutdown_requested(&mut shutdown) => {
                session.disconnect_client(SHUTDOWN_REASON);
                Handshake::Rejected
            }
        };

        match handshake {
            Handshake::Player => {
                self.serve_player(&session, &outbox, &mut reader, shutdown).await;
            }
            Handshake::Spectator(packet) => {
                self.serve_spectator(id, packet, &outbox, &mut reader, shutdown)
                    .await;
            }
            Handshake::Rejected => {}
        }

        session.release();
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(connection = id.0, "Writer stopped: {e}"),
            Err(e) => tracing::warn!(connection = id.0, "Writer task failed: {e}"),
        }
        session.on_output_drained();
        tracing::debug!(connection = id.0, %peer, "Connection finished");
    }
}

/// Resolves once shutdown is signalled or the server is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Call `ping` every `interval` until it returns `false`.
fn spawn_pinger<F>(interval: Duration, ping: F) -> JoinHandle<()>
where
    F: Fn() -> bool + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !ping() {
                break;
            }
        }
    })
}
