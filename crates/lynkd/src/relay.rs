//! Call-setup signaling relay.
//!
//! The relay never interprets signaling bodies: it resolves the target's
//! live connection and forwards, or drops. A dropped offer or ICE candidate
//! is recovered by the caller's own ICE-restart logic, not by the relay -
//! there is no retry, no queue, no error back to the sender.

use serde_json::Value;
use tracing::debug;

use lynk_core::{ConnectionId, RoomId, StatusPatch, UserId};
use lynk_protocol::ServerMessage;

use crate::delivery::PeerMap;
use crate::registry::RegistryHandle;

/// Where a signaling payload is headed.
#[derive(Debug, Clone)]
pub enum SignalTarget {
    /// A transport connection the caller already knows (from
    /// `existing-users` / `user-joined`).
    Connection(ConnectionId),

    /// A user, resolved through the identity directory at relay time.
    User(UserId),
}

/// One signaling payload, tagged by kind.
///
/// Screen-share transitions are signaling too, but they additionally flip
/// the participant's room status so later room-state queries reflect it.
#[derive(Debug, Clone)]
pub enum SignalPayload {
    /// SDP offer/answer blob.
    Signal { to: SignalTarget, signal: Value },

    /// ICE candidate.
    IceCandidate { to: SignalTarget, candidate: Value },

    /// Screen-share started/stopped in a room.
    ScreenShare {
        room_id: RoomId,
        user_id: UserId,
        sharing: bool,
    },
}

/// Forwards signaling payloads between live connections.
pub struct SignalingRelay {
    registry: RegistryHandle,
    peers: PeerMap,
}

impl SignalingRelay {
    pub fn new(registry: RegistryHandle, peers: PeerMap) -> Self {
        Self { registry, peers }
    }

    /// Relays one payload from the connection `from`.
    ///
    /// Point-to-point kinds resolve the target and forward-or-drop.
    /// Screen-share kinds update the participant's status; the registry
    /// broadcasts the transition to the rest of the room. Either way the
    /// sender never hears about a miss.
    pub async fn relay(&self, from: &ConnectionId, payload: SignalPayload) {
        match payload {
            SignalPayload::Signal { to, signal } => {
                self.forward(from, to, ServerMessage::signal(from.clone(), signal))
                    .await;
            }
            SignalPayload::IceCandidate { to, candidate } => {
                self.forward(
                    from,
                    to,
                    ServerMessage::ice_candidate(from.clone(), candidate),
                )
                .await;
            }
            SignalPayload::ScreenShare {
                room_id,
                user_id,
                sharing,
            } => {
                let updated = self
                    .registry
                    .update_status(
                        room_id.clone(),
                        user_id.clone(),
                        StatusPatch::screen_sharing(sharing),
                    )
                    .await;
                if updated.is_none() {
                    // Status update racing a leave; nothing to tell anyone.
                    debug!(
                        room_id = %room_id,
                        user_id = %user_id,
                        "Screen-share update for absent participant, dropped"
                    );
                }
            }
        }
    }

    async fn forward(&self, from: &ConnectionId, to: SignalTarget, message: ServerMessage) {
        let target = match to {
            SignalTarget::Connection(connection_id) => Some(connection_id),
            SignalTarget::User(ref user_id) => self.registry.resolve(user_id).await,
        };

        let Some(target) = target else {
            debug!(from = %from, "Signaling target offline, dropped");
            return;
        };

        if !self.peers.send(&target, &message).await {
            debug!(from = %from, to = %target, "Signaling target unreachable, dropped");
        }
    }
}
