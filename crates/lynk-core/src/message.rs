//! Direct-message entities exchanged with the message store.

use crate::{MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content category of a direct message.
///
/// The gateway never inspects the content itself; the kind travels along so
/// clients can render the payload. Mirrors the store's schema enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Audio,
    Location,
    Document,
    Poll,
    Event,
    Contact,
    Image,
    Video,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Location => "location",
            Self::Document => "document",
            Self::Poll => "poll",
            Self::Event => "event",
            Self::Contact => "contact",
            Self::Image => "image",
            Self::Video => "video",
        };
        write!(f, "{label}")
    }
}

/// A message as submitted by a sender, before the store has assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
}

impl MessageDraft {
    pub fn text(sender_id: impl Into<UserId>, receiver_id: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            message_type: MessageKind::Text,
        }
    }
}

/// A persisted message as returned by the message store.
///
/// `deleted_for` lists users who removed the message from their own view;
/// the store's query interface filters on it, the gateway only carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub message_type: MessageKind,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default)]
    pub deleted_for: Vec<UserId>,
}

impl Message {
    /// True when the sender is messaging themselves.
    ///
    /// A valid conversation: never rejected, routed like any other message.
    pub fn is_self_addressed(&self) -> bool {
        self.sender_id == self.receiver_id
    }

    /// True when `user` has deleted this message from their own view.
    pub fn is_deleted_for(&self, user: &UserId) -> bool {
        self.deleted_for.contains(user)
    }
}
