//! Lynk Gateway Daemon - presence registry and realtime relay
//!
//! This crate provides the core infrastructure for the gateway daemon:
//! - `registry` - Presence registry actor owning the identity directory and
//!   room membership
//! - `server` - TCP gateway server accepting client connections
//! - `delivery` - Live-connection writer map used for all outbound fan-out
//! - `router` / `relay` / `notify` - Message routing, call signaling, and
//!   notification dispatch
//! - `store` - External collaborator interfaces (message store, notification
//!   store, push provider) with in-process backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      lynkd daemon                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  GatewayServer  │────▶│      RegistryActor          │   │
//! │  │  (TCP socket)   │     │ (directory + room state)    │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ presence events   │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│────▶│          PeerMap            │   │
//! │  │  (per client)   │     │ (live outbound writers)     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │           │                                                 │
//! │           ▼                                                 │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ MessageRouter / SignalingRelay / NotificationDispatch│  │
//! │  │        (persist via stores, emit via PeerMap)        │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod delivery;
pub mod notify;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod store;
