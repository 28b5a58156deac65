//! Registry actor - owns all presence state and processes commands.
//!
//! The `RegistryActor` is the single owner of the identity directory and the
//! room registry. It receives commands via an mpsc channel, mutates state
//! sequentially, and publishes presence events via broadcast. Because every
//! mutation runs inside this one task, the directory and room maps need no
//! locking.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are logged but don't panic

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use lynk_core::{ConnectionId, Participant, RoomId, StatusPatch, UserId};

use super::commands::{DisconnectSummary, RegistryCommand, RegistryEvent};
use super::directory::IdentityDirectory;
use super::rooms::RoomRegistry;

/// The registry actor - owns the identity directory and room registry.
///
/// # Ownership
///
/// - `directory`: user id → live connection id (plus reverse index)
/// - `rooms`: room id → ordered participant list
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// All state mutations happen within that task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// User identity → live connection
    directory: IdentityDirectory,

    /// Call room membership
    rooms: RoomRegistry,

    /// Presence event publisher consumed by the server's fan-out task
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            receiver,
            directory: IdentityDirectory::new(),
            rooms: RoomRegistry::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            online_users = self.directory.len(),
            rooms = self.rooms.room_count(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                user_id,
                connection_id,
                respond_to,
            } => {
                let displaced = self.handle_register(user_id, connection_id);
                // Ignore send error - the caller may have dropped the receiver
                let _ = respond_to.send(displaced);
            }
            RegistryCommand::Resolve {
                user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.directory.resolve(&user_id).cloned());
            }
            RegistryCommand::JoinRoom {
                room_id,
                user_id,
                display_name,
                connection_id,
                respond_to,
            } => {
                let others = self.handle_join_room(room_id, user_id, display_name, connection_id);
                let _ = respond_to.send(others);
            }
            RegistryCommand::LeaveRoom {
                room_id,
                user_id,
                respond_to,
            } => {
                let removed = self.handle_leave_room(&room_id, &user_id);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::UpdateStatus {
                room_id,
                user_id,
                patch,
                respond_to,
            } => {
                let updated = self.handle_update_status(&room_id, &user_id, patch);
                let _ = respond_to.send(updated);
            }
            RegistryCommand::Participants {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.rooms.participants(&room_id));
            }
            RegistryCommand::Disconnect {
                connection_id,
                respond_to,
            } => {
                let summary = self.handle_disconnect(&connection_id);
                let _ = respond_to.send(summary);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Associates a user with a connection, last write wins.
    fn handle_register(
        &mut self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<ConnectionId> {
        let displaced = self.directory.register(user_id.clone(), connection_id.clone());

        if let Some(ref old) = displaced {
            debug!(
                user_id = %user_id,
                old_connection = %old,
                new_connection = %connection_id,
                "Reconnect superseded previous connection"
            );
        }

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            online_users = self.directory.len(),
            "User registered"
        );

        displaced
    }

    /// Adds a participant to a room, registering the user implicitly.
    ///
    /// The join payload's own user id is authoritative: a `join-meeting`
    /// arriving before `join` still identifies the connection.
    fn handle_join_room(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        connection_id: ConnectionId,
    ) -> Vec<Participant> {
        self.directory
            .register(user_id.clone(), connection_id.clone());

        let others = self.rooms.join(
            room_id.clone(),
            user_id.clone(),
            display_name.clone(),
            connection_id.clone(),
        );

        info!(
            room_id = %room_id,
            user_id = %user_id,
            participants = others.len() + 1,
            "Participant joined room"
        );

        // Tell everyone already in the room about the newcomer.
        if !others.is_empty() {
            let recipients: Vec<ConnectionId> =
                others.iter().map(|p| p.connection_id.clone()).collect();
            let participant = self
                .rooms
                .participants(&room_id)
                .into_iter()
                .find(|p| p.user_id == user_id);
            if let Some(participant) = participant {
                let _ = self.event_publisher.send(RegistryEvent::RoomJoined {
                    room_id,
                    participant,
                    recipients,
                });
            }
        }

        others
    }

    /// Removes a participant from a room and notifies the rest.
    fn handle_leave_room(&mut self, room_id: &RoomId, user_id: &UserId) -> bool {
        match self.rooms.leave(room_id, user_id) {
            Some(remaining) => {
                info!(
                    room_id = %room_id,
                    user_id = %user_id,
                    remaining = remaining.len(),
                    "Participant left room"
                );
                self.publish_room_left(room_id.clone(), user_id.clone(), &remaining);
                true
            }
            None => {
                // Leave racing a disconnect; nothing to clean up.
                debug!(
                    room_id = %room_id,
                    user_id = %user_id,
                    "Leave for absent participant, ignoring"
                );
                false
            }
        }
    }

    /// Applies a media-status patch; screen-share flips are broadcast.
    fn handle_update_status(
        &mut self,
        room_id: &RoomId,
        user_id: &UserId,
        patch: StatusPatch,
    ) -> Option<Participant> {
        let updated = self.rooms.update_status(room_id, user_id, patch)?;

        if let Some(sharing) = patch.screen_sharing {
            let recipients: Vec<ConnectionId> = self
                .rooms
                .participants(room_id)
                .iter()
                .filter(|p| p.user_id != *user_id)
                .map(|p| p.connection_id.clone())
                .collect();

            debug!(
                room_id = %room_id,
                user_id = %user_id,
                sharing,
                "Screen share state changed"
            );

            if !recipients.is_empty() {
                let _ = self.event_publisher.send(RegistryEvent::ScreenShare {
                    room_id: room_id.clone(),
                    user_id: user_id.clone(),
                    sharing,
                    recipients,
                });
            }
        }

        Some(updated)
    }

    /// Tears down everything a closed connection held.
    ///
    /// Directory unregister, then removal from every room the connection was
    /// in, notifying the remaining participants of each.
    fn handle_disconnect(&mut self, connection_id: &ConnectionId) -> DisconnectSummary {
        let user_id = self.directory.unregister(connection_id);

        let memberships = self.rooms.find_by_connection(connection_id);
        let mut departed_rooms = Vec::with_capacity(memberships.len());

        for (room_id, member_id) in memberships {
            if let Some(remaining) = self.rooms.leave(&room_id, &member_id) {
                self.publish_room_left(room_id.clone(), member_id, &remaining);
                departed_rooms.push(room_id);
            }
        }

        info!(
            connection_id = %connection_id,
            user_id = ?user_id.as_ref().map(|u| u.as_str()),
            departed_rooms = departed_rooms.len(),
            online_users = self.directory.len(),
            "Connection cleaned up"
        );

        DisconnectSummary {
            user_id,
            departed_rooms,
        }
    }

    fn publish_room_left(&self, room_id: RoomId, user_id: UserId, remaining: &[Participant]) {
        if remaining.is_empty() {
            return;
        }
        let recipients = remaining.iter().map(|p| p.connection_id.clone()).collect();
        let _ = self.event_publisher.send(RegistryEvent::RoomLeft {
            room_id,
            user_id,
            recipients,
        });
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Number of users currently online.
    #[cfg(test)]
    pub fn online_count(&self) -> usize {
        self.directory.len()
    }
}
