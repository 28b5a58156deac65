//! Client interface for interacting with the `RegistryActor`.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor and subscribing to presence events. Every
//! handler task holds a clone; the actor stays the single owner of state.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors degrade to `RegistryError::ChannelClosed` or empty reads

use tokio::sync::{broadcast, mpsc, oneshot};

use lynk_core::{ConnectionId, Participant, RoomId, StatusPatch, UserId};

use super::commands::{DisconnectSummary, RegistryCommand, RegistryError, RegistryEvent};

/// Handle for interacting with the registry actor.
///
/// Cheap to clone and share across tasks. Mutating operations return
/// `Result`; pure lookups swallow a closed channel and read as absent, which
/// is the correct answer while the process is shutting down.
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Presence event publisher, for subscribing
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Associate a user with a live connection (last write wins).
    ///
    /// Returns the displaced connection id when the user was already
    /// registered elsewhere.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<Option<ConnectionId>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                user_id,
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// The live connection for a user, or `None` when offline.
    pub async fn resolve(&self, user_id: &UserId) -> Option<ConnectionId> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Resolve {
                user_id: user_id.clone(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok().flatten()
    }

    /// Enter a room, creating it on first join.
    ///
    /// Implicitly registers the joining user; returns the other participants
    /// already present.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        connection_id: ConnectionId,
    ) -> Result<Vec<Participant>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::JoinRoom {
                room_id,
                user_id,
                display_name,
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Leave a room. `false` means the participant was already gone.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::LeaveRoom {
                room_id,
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Apply a partial media-status update.
    ///
    /// `None` means the participant was not found - a tolerated race with a
    /// leave, never surfaced to the user.
    pub async fn update_status(
        &self,
        room_id: RoomId,
        user_id: UserId,
        patch: StatusPatch,
    ) -> Option<Participant> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::UpdateStatus {
                room_id,
                user_id,
                patch,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok().flatten()
    }

    /// Current participants of a room (empty when unknown or on shutdown).
    pub async fn participants(&self, room_id: &RoomId) -> Vec<Participant> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Participants {
                room_id: room_id.clone(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Tear down everything a closed connection held.
    ///
    /// Returns an empty summary when the actor is already gone.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> DisconnectSummary {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Disconnect {
                connection_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return DisconnectSummary::default();
        }

        rx.await.unwrap_or_default()
    }

    /// Subscribe to presence events.
    ///
    /// Synchronous - does not talk to the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// True while the actor's command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
