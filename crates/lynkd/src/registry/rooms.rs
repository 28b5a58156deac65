//! Room registry - multi-party call membership.

use std::collections::HashMap;

use lynk_core::{ConnectionId, Participant, RoomId, StatusPatch, UserId};

/// One call/meeting room: an ordered participant list.
///
/// Rooms are created on first join and never deleted here; an emptied room
/// is marked inactive and kept (expiry is the external store's concern).
#[derive(Debug, Default)]
struct Room {
    participants: Vec<Participant>,
    active: bool,
}

impl Room {
    fn position_of(&self, user_id: &UserId) -> Option<usize> {
        self.participants.iter().position(|p| p.user_id == *user_id)
    }
}

/// In-memory registry of call rooms and their participants.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant to a room, creating the room if needed.
    ///
    /// A join for a user already present is a rejoin (browser refresh): the
    /// existing entry keeps its position and media state, only the connection
    /// id and display name are refreshed.
    ///
    /// Returns the *other* participants already in the room, so the caller
    /// knows who to signal.
    pub fn join(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        connection_id: ConnectionId,
    ) -> Vec<Participant> {
        let room = self.rooms.entry(room_id).or_default();
        room.active = true;

        match room.position_of(&user_id) {
            Some(index) => {
                if let Some(existing) = room.participants.get_mut(index) {
                    existing.connection_id = connection_id;
                    existing.display_name = display_name;
                }
            }
            None => {
                room.participants
                    .push(Participant::new(user_id.clone(), display_name, connection_id));
            }
        }

        room.participants
            .iter()
            .filter(|p| p.user_id != user_id)
            .cloned()
            .collect()
    }

    /// Removes a participant from a room.
    ///
    /// Returns the remaining participants, or `None` when the room or the
    /// participant was already gone (tolerated race with disconnect).
    pub fn leave(&mut self, room_id: &RoomId, user_id: &UserId) -> Option<Vec<Participant>> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room.position_of(user_id)?;
        room.participants.remove(index);
        if room.participants.is_empty() {
            room.active = false;
        }
        Some(room.participants.clone())
    }

    /// Applies a partial media-status update to a participant.
    ///
    /// Silent no-op (`None`) when the participant is not in the room: a
    /// status update racing a leave is expected and never an error.
    pub fn update_status(
        &mut self,
        room_id: &RoomId,
        user_id: &UserId,
        patch: StatusPatch,
    ) -> Option<Participant> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room.position_of(user_id)?;
        let participant = room.participants.get_mut(index)?;
        participant.apply(&patch);
        Some(participant.clone())
    }

    /// Current participants of a room (empty if the room is unknown).
    pub fn participants(&self, room_id: &RoomId) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|room| room.participants.clone())
            .unwrap_or_default()
    }

    /// Every membership held by `connection_id`.
    ///
    /// Used on ungraceful disconnect to know which rooms to clean up.
    pub fn find_by_connection(&self, connection_id: &ConnectionId) -> Vec<(RoomId, UserId)> {
        self.rooms
            .iter()
            .flat_map(|(room_id, room)| {
                room.participants
                    .iter()
                    .filter(|p| p.connection_id == *connection_id)
                    .map(|p| (room_id.clone(), p.user_id.clone()))
            })
            .collect()
    }

    /// True when the room exists and still expects signaling traffic.
    pub fn is_active(&self, room_id: &RoomId) -> bool {
        self.rooms.get(room_id).map(|r| r.active).unwrap_or(false)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
