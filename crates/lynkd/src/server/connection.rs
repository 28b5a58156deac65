//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Gates the first frame on protocol version
//! - Parses incoming events and routes them to the registry, router, relay,
//!   and dispatcher
//! - Tears down presence state when the connection closes
//!
//! The handler tracks the connection's lifecycle: it starts anonymous,
//! becomes identified once a `join` (or a `join-meeting`, which identifies
//! implicitly) names a user, and triggers full registry cleanup on close.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed frames produce an error event, never a closed loop

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use lynk_core::{ConnectionId, UserId};
use lynk_protocol::{ClientEvent, ClientMessage, ProtocolVersion, ServerMessage};

use crate::delivery::{PeerMap, PeerWriter};
use crate::notify::NotificationDispatcher;
use crate::registry::{RegistryError, RegistryHandle};
use crate::relay::{SignalPayload, SignalTarget, SignalingRelay};
use crate::router::MessageRouter;

/// Maximum frame size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
///
/// Manages the lifecycle of a client connection including version gating,
/// the event processing loop, and disconnect cleanup.
pub struct ConnectionHandler {
    /// Buffered reader for incoming frames
    reader: BufReader<OwnedReadHalf>,

    /// Shared writer for this connection (also registered in the peer map)
    writer: PeerWriter,

    /// This connection's id
    connection_id: ConnectionId,

    /// The user this connection identified as, once known
    user: Option<UserId>,

    /// Whether the first frame passed the version gate
    version_checked: bool,

    registry: RegistryHandle,
    peers: PeerMap,
    router: Arc<MessageRouter>,
    relay: Arc<SignalingRelay>,
    notifier: Arc<NotificationDispatcher>,
}

impl ConnectionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: OwnedReadHalf,
        writer: PeerWriter,
        connection_id: ConnectionId,
        registry: RegistryHandle,
        peers: PeerMap,
        router: Arc<MessageRouter>,
        relay: Arc<SignalingRelay>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            connection_id,
            user: None,
            version_checked: false,
            registry,
            peers,
            router,
            relay,
            notifier,
        }
    }

    /// Runs the connection handler.
    ///
    /// Processes events until the connection closes, then tears down the
    /// presence state the connection held. Returns the connection id.
    pub async fn run(mut self) -> ConnectionId {
        debug!(connection_id = %self.connection_id, "Client connected");

        if let Err(e) = self.process_messages().await {
            match e {
                ConnectionError::Eof => {
                    debug!(connection_id = %self.connection_id, "Client closed connection");
                }
                ConnectionError::Timeout => {
                    debug!(connection_id = %self.connection_id, "Connection idle, closing");
                }
                _ => {
                    debug!(
                        connection_id = %self.connection_id,
                        error = %e,
                        "Connection closed"
                    );
                }
            }
        }

        // Disconnected is terminal: unregister the identity, leave every
        // room, let the registry broadcast user-left to the peers.
        let summary = self.registry.disconnect(self.connection_id.clone()).await;

        info!(
            connection_id = %self.connection_id,
            user_id = ?summary.user_id.as_ref().map(|u| u.as_str()),
            departed_rooms = summary.departed_rooms.len(),
            "Client disconnected"
        );

        self.connection_id
    }

    /// Main event processing loop.
    ///
    /// Reads frames until the connection closes or goes idle. A frame that
    /// fails to parse produces an `error` event and the loop continues;
    /// only transport errors and the version gate end the connection.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let line = match timeout(READ_TIMEOUT, self.read_frame()).await {
                Ok(Ok(line)) => line,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ConnectionError::Timeout),
            };

            let msg: ClientMessage = match serde_json::from_str(&line) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(
                        connection_id = %self.connection_id,
                        error = %e,
                        "Failed to parse frame"
                    );
                    self.send(&ServerMessage::error(&format!("invalid message: {e}")))
                        .await?;
                    continue;
                }
            };

            if !self.version_checked {
                let client_version = msg.protocol_version;
                if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
                    warn!(
                        client_version = %client_version,
                        server_version = %ProtocolVersion::CURRENT,
                        "Protocol version mismatch"
                    );
                    self.send(&ServerMessage::rejected(&format!(
                        "protocol version {} not compatible with server version {}",
                        client_version,
                        ProtocolVersion::CURRENT
                    )))
                    .await?;
                    return Err(ConnectionError::VersionMismatch {
                        client: client_version,
                        server: ProtocolVersion::CURRENT,
                    });
                }
                self.version_checked = true;
            }

            self.handle_event(msg.event).await?;
        }
    }

    /// Handles a single client event.
    async fn handle_event(&mut self, event: ClientEvent) -> Result<(), ConnectionError> {
        match event {
            ClientEvent::Join { user_id } => {
                self.user = Some(user_id.clone());
                let displaced = self
                    .registry
                    .register(user_id.clone(), self.connection_id.clone())
                    .await?;
                if let Some(old) = displaced {
                    debug!(
                        user_id = %user_id,
                        superseded = %old,
                        "Reconnect took over identity"
                    );
                }
                self.send(&ServerMessage::connected(self.connection_id.clone()))
                    .await?;
            }

            ClientEvent::JoinMeeting {
                meeting_id,
                user_id,
                username,
            } => {
                // The join payload's user id is authoritative even when no
                // `join` was seen first.
                self.user = Some(user_id.clone());
                let others = self
                    .registry
                    .join_room(
                        meeting_id,
                        user_id,
                        username,
                        self.connection_id.clone(),
                    )
                    .await?;
                self.send(&ServerMessage::existing_users(others)).await?;
            }

            ClientEvent::LeaveMeeting {
                meeting_id,
                user_id,
            } => {
                self.registry.leave_room(meeting_id, user_id).await?;
            }

            ClientEvent::SendMessage { draft } => {
                self.router.route(draft, &self.connection_id).await;
            }

            ClientEvent::RoomMessage {
                room_id,
                username,
                message,
            } => {
                let participants = self.registry.participants(&room_id).await;
                let is_member = self
                    .user
                    .as_ref()
                    .map(|user| participants.iter().any(|p| p.user_id == *user))
                    .unwrap_or(false);

                if !is_member {
                    self.send(&ServerMessage::error("not in this room")).await?;
                    return Ok(());
                }

                let recipients: Vec<ConnectionId> = participants
                    .iter()
                    .map(|p| p.connection_id.clone())
                    .collect();
                self.peers
                    .send_many(
                        &recipients,
                        &ServerMessage::receive_message(room_id, username, message),
                    )
                    .await;
            }

            ClientEvent::Signal { to, from: _, signal } => {
                // The socket we read the frame from is the authoritative
                // sender, whatever the payload claims.
                self.relay
                    .relay(
                        &self.connection_id,
                        SignalPayload::Signal {
                            to: SignalTarget::Connection(to),
                            signal,
                        },
                    )
                    .await;
            }

            ClientEvent::IceCandidate { to, candidate } => {
                self.relay
                    .relay(
                        &self.connection_id,
                        SignalPayload::IceCandidate {
                            to: SignalTarget::Connection(to),
                            candidate,
                        },
                    )
                    .await;
            }

            ClientEvent::StartScreenShare { room_id, user_id } => {
                self.relay
                    .relay(
                        &self.connection_id,
                        SignalPayload::ScreenShare {
                            room_id,
                            user_id,
                            sharing: true,
                        },
                    )
                    .await;
            }

            ClientEvent::StopScreenShare { room_id, user_id } => {
                self.relay
                    .relay(
                        &self.connection_id,
                        SignalPayload::ScreenShare {
                            room_id,
                            user_id,
                            sharing: false,
                        },
                    )
                    .await;
            }

            ClientEvent::SendNotification { draft } => {
                self.notifier.dispatch(draft, &self.connection_id).await;
            }

            ClientEvent::MarkNotificationRead { notification_id } => {
                self.notifier
                    .mark_read(&notification_id, &self.connection_id)
                    .await;
            }

            ClientEvent::FetchMessages {
                user_id,
                target_user_id,
            } => {
                self.router
                    .history(&user_id, &target_user_id, &self.connection_id)
                    .await;
            }

            ClientEvent::Ping { seq } => {
                self.send(&ServerMessage::pong(seq)).await?;
            }
        }

        Ok(())
    }

    /// Reads a single newline-terminated frame.
    async fn read_frame(&mut self) -> Result<String, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(line)
    }

    /// Sends a message back on this connection.
    async fn send(&self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(msg).map_err(|e| ConnectionError::Parse(e.to_string()))?;

        let mut writer = self.writer.lock().await;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// The user this connection identified as, if any.
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::VersionMismatch {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert!(err.to_string().contains("2.0"));
        assert!(err.to_string().contains("1.0"));
    }

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }
}
