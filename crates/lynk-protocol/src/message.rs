//! Protocol message types for gateway communication.

use crate::version::ProtocolVersion;
use lynk_core::{
    ConnectionId, Message, MessageDraft, Notification, NotificationDraft, NotificationId,
    Participant, RoomId, UserId,
};
use serde::{Deserialize, Serialize};

/// Events sent by clients to the gateway.
///
/// Signaling bodies (`signal`, `candidate`) are opaque JSON relayed verbatim;
/// the gateway never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Associate this connection with a user identity (reconnect-safe).
    Join {
        #[serde(rename = "userId")]
        user_id: UserId,
    },

    /// Enter a call/meeting room. Identifies the connection implicitly if no
    /// `join` was seen first.
    #[serde(rename = "join-meeting", rename_all = "camelCase")]
    JoinMeeting {
        meeting_id: RoomId,
        user_id: UserId,
        username: String,
    },

    /// Leave a call/meeting room.
    #[serde(rename = "leave-meeting", rename_all = "camelCase")]
    LeaveMeeting {
        meeting_id: RoomId,
        user_id: UserId,
    },

    /// Send a direct message to another user.
    SendMessage {
        #[serde(flatten)]
        draft: MessageDraft,
    },

    /// Send an ephemeral chat line to everyone in a room.
    #[serde(rename = "send-message", rename_all = "camelCase")]
    RoomMessage {
        room_id: RoomId,
        username: String,
        message: String,
    },

    /// Relay an SDP offer/answer blob to another connection.
    Signal {
        to: ConnectionId,
        #[serde(default)]
        from: Option<ConnectionId>,
        signal: serde_json::Value,
    },

    /// Relay an ICE candidate to another connection.
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        to: ConnectionId,
        candidate: serde_json::Value,
    },

    /// Mark this participant as sharing their screen and tell the room.
    #[serde(rename = "start-screen-share", rename_all = "camelCase")]
    StartScreenShare {
        room_id: RoomId,
        user_id: UserId,
    },

    /// Clear this participant's screen-share flag and tell the room.
    #[serde(rename = "stop-screen-share", rename_all = "camelCase")]
    StopScreenShare {
        room_id: RoomId,
        user_id: UserId,
    },

    /// Persist a notification and deliver it to its recipient.
    SendNotification {
        #[serde(flatten)]
        draft: NotificationDraft,
    },

    /// Mark a stored notification as read.
    MarkNotificationRead {
        #[serde(rename = "notificationId")]
        notification_id: NotificationId,
    },

    /// Fetch the stored conversation between two users.
    #[serde(rename_all = "camelCase")]
    FetchMessages {
        user_id: UserId,
        target_user_id: UserId,
    },

    /// Heartbeat.
    Ping { seq: u64 },
}

/// Messages sent from client to gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version; absent means current (browser clients omit it).
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: ProtocolVersion,

    /// Event payload
    #[serde(flatten)]
    pub event: ClientEvent,
}

impl ClientMessage {
    /// Creates a client message with the current protocol version.
    pub fn new(event: ClientEvent) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            event,
        }
    }

    pub fn join(user_id: impl Into<UserId>) -> Self {
        Self::new(ClientEvent::Join {
            user_id: user_id.into(),
        })
    }

    pub fn join_meeting(
        meeting_id: impl Into<RoomId>,
        user_id: impl Into<UserId>,
        username: impl Into<String>,
    ) -> Self {
        Self::new(ClientEvent::JoinMeeting {
            meeting_id: meeting_id.into(),
            user_id: user_id.into(),
            username: username.into(),
        })
    }

    pub fn leave_meeting(meeting_id: impl Into<RoomId>, user_id: impl Into<UserId>) -> Self {
        Self::new(ClientEvent::LeaveMeeting {
            meeting_id: meeting_id.into(),
            user_id: user_id.into(),
        })
    }

    pub fn send_message(draft: MessageDraft) -> Self {
        Self::new(ClientEvent::SendMessage { draft })
    }

    pub fn room_message(
        room_id: impl Into<RoomId>,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ClientEvent::RoomMessage {
            room_id: room_id.into(),
            username: username.into(),
            message: message.into(),
        })
    }

    pub fn signal(to: impl Into<ConnectionId>, signal: serde_json::Value) -> Self {
        Self::new(ClientEvent::Signal {
            to: to.into(),
            from: None,
            signal,
        })
    }

    pub fn ice_candidate(to: impl Into<ConnectionId>, candidate: serde_json::Value) -> Self {
        Self::new(ClientEvent::IceCandidate {
            to: to.into(),
            candidate,
        })
    }

    pub fn send_notification(draft: NotificationDraft) -> Self {
        Self::new(ClientEvent::SendNotification { draft })
    }

    pub fn mark_notification_read(notification_id: impl Into<NotificationId>) -> Self {
        Self::new(ClientEvent::MarkNotificationRead {
            notification_id: notification_id.into(),
        })
    }

    pub fn fetch_messages(user_id: impl Into<UserId>, target_user_id: impl Into<UserId>) -> Self {
        Self::new(ClientEvent::FetchMessages {
            user_id: user_id.into(),
            target_user_id: target_user_id.into(),
        })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(ClientEvent::Ping { seq })
    }
}

/// Events sent from the gateway to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection identified; carries the transport id clients use as the
    /// `from`/`to` endpoint of signaling payloads.
    #[serde(rename_all = "camelCase")]
    Connected {
        protocol_version: ProtocolVersion,
        connection_id: ConnectionId,
    },

    /// Connection refused (protocol version mismatch).
    #[serde(rename_all = "camelCase")]
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// A participant entered a room this client is in.
    #[serde(rename = "user-joined", rename_all = "camelCase")]
    UserJoined {
        id: UserId,
        username: String,
        connection_id: ConnectionId,
    },

    /// A participant left a room this client is in.
    #[serde(rename = "user-left")]
    UserLeft { id: UserId },

    /// Reply to a room join: the participants already present.
    #[serde(rename = "existing-users")]
    ExistingUsers { users: Vec<Participant> },

    /// Room chat line fan-out.
    #[serde(rename = "receive-message", rename_all = "camelCase")]
    ReceiveMessage {
        room_id: RoomId,
        username: String,
        message: String,
    },

    /// A direct message addressed to this client's user.
    NewMessage { message: Message },

    /// Ack to the sender: the message was persisted (carries the stored id).
    MessageSent { message: Message },

    /// The message could not be persisted; it was not sent.
    MessageError { reason: String },

    /// Reply to a history fetch.
    MessageHistory { messages: Vec<Message> },

    /// A notification addressed to this client's user.
    NewNotification { notification: Notification },

    /// Ack to a read-marking, echoing the updated record.
    NotificationRead { notification: Notification },

    /// The notification could not be persisted or updated.
    NotificationError { reason: String },

    /// Relayed SDP blob.
    Signal {
        from: ConnectionId,
        signal: serde_json::Value,
    },

    /// Relayed ICE candidate.
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        from: ConnectionId,
        candidate: serde_json::Value,
    },

    /// A room participant started sharing their screen.
    #[serde(rename = "screen-share-started", rename_all = "camelCase")]
    ScreenShareStarted { room_id: RoomId, user_id: UserId },

    /// A room participant stopped sharing their screen.
    #[serde(rename = "screen-share-stopped", rename_all = "camelCase")]
    ScreenShareStopped { room_id: RoomId, user_id: UserId },

    /// Heartbeat response.
    Pong { seq: u64 },

    /// Generic request error (malformed payload, not in room, ...).
    Error { message: String },
}

impl ServerMessage {
    pub fn connected(connection_id: ConnectionId) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            connection_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn user_joined(participant: &Participant) -> Self {
        Self::UserJoined {
            id: participant.user_id.clone(),
            username: participant.display_name.clone(),
            connection_id: participant.connection_id.clone(),
        }
    }

    pub fn user_left(id: UserId) -> Self {
        Self::UserLeft { id }
    }

    pub fn existing_users(users: Vec<Participant>) -> Self {
        Self::ExistingUsers { users }
    }

    pub fn receive_message(room_id: RoomId, username: String, message: String) -> Self {
        Self::ReceiveMessage {
            room_id,
            username,
            message,
        }
    }

    pub fn new_message(message: Message) -> Self {
        Self::NewMessage { message }
    }

    pub fn message_sent(message: Message) -> Self {
        Self::MessageSent { message }
    }

    pub fn message_error(reason: &str) -> Self {
        Self::MessageError {
            reason: reason.to_string(),
        }
    }

    pub fn message_history(messages: Vec<Message>) -> Self {
        Self::MessageHistory { messages }
    }

    pub fn new_notification(notification: Notification) -> Self {
        Self::NewNotification { notification }
    }

    pub fn notification_read(notification: Notification) -> Self {
        Self::NotificationRead { notification }
    }

    pub fn notification_error(reason: &str) -> Self {
        Self::NotificationError {
            reason: reason.to_string(),
        }
    }

    pub fn signal(from: ConnectionId, signal: serde_json::Value) -> Self {
        Self::Signal { from, signal }
    }

    pub fn ice_candidate(from: ConnectionId, candidate: serde_json::Value) -> Self {
        Self::IceCandidate { from, candidate }
    }

    pub fn screen_share(room_id: RoomId, user_id: UserId, sharing: bool) -> Self {
        if sharing {
            Self::ScreenShareStarted { room_id, user_id }
        } else {
            Self::ScreenShareStopped { room_id, user_id }
        }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lynk_core::MessageKind;

    #[test]
    fn test_join_serialization() {
        let msg = ClientMessage::join("u1");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("\"userId\":\"u1\""));
    }

    #[test]
    fn test_kebab_case_event_names() {
        let msg = ClientMessage::join_meeting("room-42", "u1", "alice");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join-meeting\""));
        assert!(json.contains("\"meetingId\":\"room-42\""));

        let msg = ClientMessage::ice_candidate("conn-2", serde_json::json!({"sdpMid": "0"}));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ice-candidate\""));
    }

    #[test]
    fn test_direct_and_room_message_are_distinct_events() {
        let direct = ClientMessage::send_message(MessageDraft::text("u1", "u2", "hi"));
        let json = serde_json::to_string(&direct).unwrap();
        assert!(json.contains("\"type\":\"send_message\""));
        assert!(json.contains("\"senderId\":\"u1\""));

        let room = ClientMessage::room_message("room-42", "alice", "hi all");
        let json = serde_json::to_string(&room).unwrap();
        assert!(json.contains("\"type\":\"send-message\""));
        assert!(json.contains("\"roomId\":\"room-42\""));
    }

    #[test]
    fn test_send_message_parses_flattened_draft() {
        let json = r#"{"type":"send_message","senderId":"u1","receiverId":"u2","content":"hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg.event {
            ClientEvent::SendMessage { draft } => {
                assert_eq!(draft.sender_id.as_str(), "u1");
                assert_eq!(draft.receiver_id.as_str(), "u2");
                assert_eq!(draft.message_type, MessageKind::Text);
            }
            other => panic!("Expected SendMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_version_defaults_when_absent() {
        let json = r#"{"type":"ping","seq":3}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.protocol_version, ProtocolVersion::CURRENT);
        assert!(matches!(msg.event, ClientEvent::Ping { seq: 3 }));
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::connected(ConnectionId::from_index(1));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connectionId\":\"conn-1\""));

        let msg = ServerMessage::user_left(UserId::new("u2"));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"user-left\""));
        assert!(json.contains("\"id\":\"u2\""));
    }

    #[test]
    fn test_screen_share_ctor_picks_variant() {
        let started = ServerMessage::screen_share(RoomId::new("r1"), UserId::new("u1"), true);
        let json = serde_json::to_string(&started).unwrap();
        assert!(json.contains("\"type\":\"screen-share-started\""));

        let stopped = ServerMessage::screen_share(RoomId::new("r1"), UserId::new("u1"), false);
        let json = serde_json::to_string(&stopped).unwrap();
        assert!(json.contains("\"type\":\"screen-share-stopped\""));
    }

    #[test]
    fn test_message_roundtrip() {
        let original = ClientMessage::fetch_messages("u1", "u3");
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();

        match parsed.event {
            ClientEvent::FetchMessages {
                user_id,
                target_user_id,
            } => {
                assert_eq!(user_id.as_str(), "u1");
                assert_eq!(target_user_id.as_str(), "u3");
            }
            other => panic!("Expected FetchMessages, got {other:?}"),
        }
    }
}
