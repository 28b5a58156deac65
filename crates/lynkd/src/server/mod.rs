//! TCP gateway server.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Fans presence events out to the affected live connections
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  GatewayServer  │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!         │                        │ presence events
//!         ▼                        ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     PeerMap     │◀────│  fan-out task   │
//! │ (live writers)  │     └─────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the loop continues

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::BufWriter;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lynk_core::ConnectionId;
use lynk_protocol::ServerMessage;

use crate::delivery::PeerMap;
use crate::notify::NotificationDispatcher;
use crate::registry::{RegistryEvent, RegistryHandle};
use crate::relay::SignalingRelay;
use crate::router::MessageRouter;
use crate::store::GatewayStores;

/// Default bind address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7420";

/// Maximum number of concurrent client connections
const MAX_CLIENTS: usize = 1024;

/// TCP gateway server.
///
/// Owns the listener, the live-writer map, and the routing components; hands
/// each accepted connection to its own handler task.
pub struct GatewayServer {
    /// Bound listener
    listener: TcpListener,

    /// Handle to the presence registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection ids
    connection_counter: AtomicU64,

    /// Live outbound writers
    peers: PeerMap,

    router: Arc<MessageRouter>,
    relay: Arc<SignalingRelay>,
    notifier: Arc<NotificationDispatcher>,
}

impl GatewayServer {
    /// Binds the listener and wires the routing components.
    pub async fn bind(
        addr: &str,
        registry: RegistryHandle,
        stores: GatewayStores,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;

        let peers = PeerMap::new();
        let router = Arc::new(MessageRouter::new(
            stores.messages,
            registry.clone(),
            peers.clone(),
        ));
        let relay = Arc::new(SignalingRelay::new(registry.clone(), peers.clone()));
        let notifier = Arc::new(NotificationDispatcher::new(
            stores.notifications,
            stores.push,
            stores.subscriptions,
            registry.clone(),
            peers.clone(),
        ));

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            peers,
            router,
            relay,
            notifier,
        })
    }

    /// The address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Number of live client connections.
    pub async fn client_count(&self) -> usize {
        self.peers.len().await
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token fires. This method
    /// does not return until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = ?self.local_addr(),
            "Gateway server listening"
        );

        self.spawn_presence_fanout();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.peers.len().await >= MAX_CLIENTS {
                                warn!(%addr, max = MAX_CLIENTS, "Client limit reached, refusing connection");
                                drop(stream);
                                continue;
                            }
                            let index = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, index);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Keep accepting other connections
                        }
                    }
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Hands a new client connection to its own handler task.
    fn handle_connection(&self, stream: TcpStream, index: u64) {
        let connection_id = ConnectionId::from_index(index);
        let (reader, writer) = stream.into_split();
        let writer = Arc::new(Mutex::new(BufWriter::new(writer)));

        let handler = ConnectionHandler::new(
            reader,
            Arc::clone(&writer),
            connection_id.clone(),
            self.registry.clone(),
            self.peers.clone(),
            Arc::clone(&self.router),
            Arc::clone(&self.relay),
            Arc::clone(&self.notifier),
        );

        let peers = self.peers.clone();
        tokio::spawn(async move {
            peers.insert(connection_id.clone(), writer).await;

            handler.run().await;

            // The handler already tore down registry state; drop the writer
            // so nothing routes to the dead socket.
            peers.remove(&connection_id).await;
        });
    }

    /// Spawns the presence fan-out task.
    ///
    /// Receives presence events from the registry and writes them to the
    /// connections each event names.
    fn spawn_presence_fanout(&self) {
        let mut event_rx = self.registry.subscribe();
        let peers = self.peers.clone();
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Presence fan-out shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                deliver_presence_event(&peers, event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Presence fan-out lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Presence event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Turns one presence event into a wire message and delivers it.
async fn deliver_presence_event(peers: &PeerMap, event: RegistryEvent) {
    let (message, recipients) = match event {
        RegistryEvent::RoomJoined {
            room_id,
            participant,
            recipients,
        } => {
            debug!(room_id = %room_id, user_id = %participant.user_id, "Fanning out user-joined");
            (ServerMessage::user_joined(&participant), recipients)
        }
        RegistryEvent::RoomLeft {
            room_id,
            user_id,
            recipients,
        } => {
            debug!(room_id = %room_id, user_id = %user_id, "Fanning out user-left");
            (ServerMessage::user_left(user_id), recipients)
        }
        RegistryEvent::ScreenShare {
            room_id,
            user_id,
            sharing,
            recipients,
        } => (
            ServerMessage::screen_share(room_id, user_id, sharing),
            recipients,
        ),
    };

    peers.send_many(&recipients, &message).await;
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
