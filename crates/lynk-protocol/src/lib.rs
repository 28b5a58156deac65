//! Lynk Protocol - Wire protocol for the realtime gateway
//!
//! This crate provides the message types exchanged over a gateway socket:
//! client events (joins, messages, signaling, notifications) and server
//! events (delivery, presence broadcasts, acks, errors). All messages are
//! newline-delimited JSON with a `type` tag.

pub mod message;
pub mod version;

pub use message::{ClientEvent, ClientMessage, ServerMessage};
pub use version::ProtocolVersion;
