//! Registry actor commands, errors, and presence events.
//!
//! This module defines the message types for communicating with the
//! `RegistryActor`:
//! - `RegistryCommand`: commands sent to the actor
//! - `RegistryError`: errors that can occur during registry operations
//! - `RegistryEvent`: presence events published for the fan-out task
//!
//! All types are designed for async message passing and follow the
//! panic-free policy.

use lynk_core::{ConnectionId, Participant, RoomId, StatusPatch, UserId};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Associate a user with a live connection (last write wins).
    ///
    /// Responds with the displaced connection id, if the user was already
    /// registered elsewhere.
    Register {
        user_id: UserId,
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<ConnectionId>>,
    },

    /// Look up the live connection for a user.
    Resolve {
        user_id: UserId,
        respond_to: oneshot::Sender<Option<ConnectionId>>,
    },

    /// Add a participant to a room, creating it on first join.
    ///
    /// Performs an implicit `Register` for the joining user: a join that
    /// arrives before the connection identified itself is never rejected.
    /// Responds with the *other* participants already present.
    JoinRoom {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Vec<Participant>>,
    },

    /// Remove a participant from a room.
    ///
    /// Responds with `true` when a participant was actually removed; a miss
    /// is a tolerated race, not an error.
    LeaveRoom {
        room_id: RoomId,
        user_id: UserId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Apply a partial media-status update to a participant.
    ///
    /// Responds with the updated participant, or `None` when the participant
    /// was already gone (status update racing a leave).
    UpdateStatus {
        room_id: RoomId,
        user_id: UserId,
        patch: StatusPatch,
        respond_to: oneshot::Sender<Option<Participant>>,
    },

    /// Current participant list of a room.
    Participants {
        room_id: RoomId,
        respond_to: oneshot::Sender<Vec<Participant>>,
    },

    /// Full teardown for a closed connection: directory unregister plus
    /// removal from every room the connection was in.
    Disconnect {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<DisconnectSummary>,
    },
}

/// What a connection's teardown touched.
#[derive(Debug, Clone, Default)]
pub struct DisconnectSummary {
    /// The user the connection identified as, if it was still current.
    pub user_id: Option<UserId>,

    /// Rooms the connection was removed from.
    pub departed_rooms: Vec<RoomId>,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Presence Events
// ============================================================================

/// Presence events published by the registry.
///
/// Each event carries the connection ids it should reach; the server's
/// fan-out task turns them into wire messages and writes them to those
/// connections. Delivery is best-effort.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A participant entered a room.
    RoomJoined {
        room_id: RoomId,
        participant: Participant,
        recipients: Vec<ConnectionId>,
    },

    /// A participant left a room (explicit leave or disconnect).
    RoomLeft {
        room_id: RoomId,
        user_id: UserId,
        recipients: Vec<ConnectionId>,
    },

    /// A participant's screen-share state flipped.
    ScreenShare {
        room_id: RoomId,
        user_id: UserId,
        sharing: bool,
        recipients: Vec<ConnectionId>,
    },
}

impl RegistryEvent {
    /// Connection ids this event should be delivered to.
    pub fn recipients(&self) -> &[ConnectionId] {
        match self {
            Self::RoomJoined { recipients, .. }
            | Self::RoomLeft { recipients, .. }
            | Self::ScreenShare { recipients, .. } => recipients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            RegistryError::ChannelClosed.to_string(),
            "registry channel closed"
        );
    }

    #[test]
    fn test_event_recipients_accessor() {
        let event = RegistryEvent::RoomLeft {
            room_id: RoomId::new("r1"),
            user_id: UserId::new("u1"),
            recipients: vec![ConnectionId::new("c2"), ConnectionId::new("c3")],
        };
        assert_eq!(event.recipients().len(), 2);
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<Option<ConnectionId>>();

        tokio::spawn(async move {
            tx.send(Some(ConnectionId::new("c1"))).ok();
        });

        let result = rx.await;
        assert_eq!(result.ok().flatten(), Some(ConnectionId::new("c1")));
    }
}
