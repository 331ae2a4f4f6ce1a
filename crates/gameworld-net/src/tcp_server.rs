//! TCP accept loop that hands each client connection to a protocol handler.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, watch};

use crate::socket::{SocketConfig, configure_stream, create_listener};

/// Unique identifier for a TCP connection within a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the connection map is at capacity.
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionLimitReached;

/// Thread-safe registry of live connections keyed by [`ConnectionId`].
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, SocketAddr>>,
    max_connections: usize,
}

impl ConnectionMap {
    /// Create a new map with the given capacity limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Record a connection. Returns `Err` if the map is at capacity.
    pub async fn insert(
        &self,
        id: ConnectionId,
        peer: SocketAddr,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, peer);
        Ok(())
    }

    /// Forget a connection.
    pub async fn remove(&self, id: &ConnectionId) -> Option<SocketAddr> {
        self.inner.write().await.remove(id)
    }

    /// Peer address of a live connection.
    pub async fn peer(&self, id: &ConnectionId) -> Option<SocketAddr> {
        self.inner.read().await.get(id).copied()
    }

    /// Return the number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Return whether the map is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Protocol driver invoked once per accepted connection.
///
/// The returned future owns the stream for the whole connection lifetime and
/// should return promptly once `shutdown` flips to `true`.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Drive one connection to completion.
    fn handle(
        self: Arc<Self>,
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = ()> + Send;
}

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Options applied to the listener and accepted sockets.
    pub socket: SocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7172)),
            max_connections: 1024,
            socket: SocketConfig::default(),
        }
    }
}

/// TCP game server that accepts connections and manages their lifecycle.
pub struct GameServer {
    config: ServerConfig,
    /// Live connection map (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            connections: Arc::new(ConnectionMap::new(config.max_connections)),
            id_gen: Arc::new(IdGenerator::new()),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run<H: ConnectionHandler>(&self, handler: Arc<H>) -> std::io::Result<()> {
        let listener = create_listener(self.config.bind_addr, &self.config.socket).await?;
        tracing::info!("Game server listening on {}", self.config.bind_addr);
        self.run_with_listener(listener, handler).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener<H: ConnectionHandler>(
        &self,
        listener: TcpListener,
        handler: Arc<H>,
    ) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // Transient (e.g. EMFILE); keep serving existing clients.
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };

                    if let Err(e) = configure_stream(&stream, &self.config.socket) {
                        tracing::warn!("Failed to configure socket for {peer}: {e}");
                    }

                    let id = self.id_gen.next_id();
                    if self.connections.insert(id, peer).await.is_err() {
                        tracing::warn!("Connection limit reached, rejecting {peer}");
                        continue;
                    }

                    tracing::debug!("Accepted connection {id:?} from {peer}");

                    let connections = Arc::clone(&self.connections);
                    let handler = Arc::clone(&handler);
                    let task_shutdown = self.shutdown_rx.clone();

                    tokio::spawn(async move {
                        handler.handle(id, stream, peer, task_shutdown).await;
                        connections.remove(&id).await;
                        tracing::debug!("Connection {id:?} closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Game server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and every connection handler to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}
