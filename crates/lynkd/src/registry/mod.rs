//! Presence registry using the actor pattern.
//!
//! The registry is the single owner of presence state: which user is live on
//! which transport connection (identity directory) and who is in which call
//! room (room registry). It receives commands via a tokio mpsc channel,
//! mutates state sequentially in one task, and publishes presence events on
//! a broadcast channel for the server's fan-out task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Connection      │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! │ handlers        │     │                 │     │ (presence events)│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │   RegistryCommand     │  IdentityDirectory     │
//!         │   (mpsc channel)      │  RoomRegistry          ▼
//!         ▼                       ▼                  fan-out task →
//!    register/join/leave    single-task mutation     live connections
//! ```
//!
//! Because the actor is the only task touching the maps, the directory and
//! room registry need no locks; all operations are plain map reads/writes.

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod directory;
mod handle;
mod rooms;

pub use actor::RegistryActor;
pub use commands::{DisconnectSummary, RegistryCommand, RegistryError, RegistryEvent};
pub use directory::IdentityDirectory;
pub use handle::RegistryHandle;
pub use rooms::RoomRegistry;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command and event channels
/// 2. Spawns the `RegistryActor` on a tokio task
/// 3. Returns a `RegistryHandle` for handler use
///
/// # Example
///
/// ```no_run
/// use lynkd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = spawn_registry();
///
///     let online = registry.resolve(&"u1".into()).await;
///     assert!(online.is_none());
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone());
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
