//! Lynk Core - Shared domain types for the realtime gateway
//!
//! This crate provides the entities the gateway routes: direct messages,
//! notifications, room participants, and the identifiers that tie a logical
//! user to a live transport connection.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`.

pub mod id;
pub mod message;
pub mod notification;
pub mod room;

// Re-exports for convenience
pub use id::{ConnectionId, MessageId, NotificationId, RoomId, UserId};
pub use message::{Message, MessageDraft, MessageKind};
pub use notification::{
    Notification, NotificationDraft, NotificationKind, NotificationStatus, Priority,
};
pub use room::{Participant, StatusPatch};
