//! Live-connection writer map.
//!
//! Every outbound event leaves the process through here: the connection
//! handlers register their write halves under their connection id, and the
//! router, relay, dispatcher, and presence fan-out resolve a connection id
//! to a writer at the moment of sending. A connection that is not in the map
//! is simply not live - delivery to it is skipped, never queued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error};

use lynk_core::ConnectionId;
use lynk_protocol::ServerMessage;

/// Write timeout for one outbound frame.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handle to one connection's buffered writer.
pub type PeerWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Map of live connections to their outbound writers.
///
/// Cheap to clone; shared between the server, every connection handler, and
/// the routing components.
#[derive(Clone, Default)]
pub struct PeerMap {
    inner: Arc<RwLock<HashMap<ConnectionId, PeerWriter>>>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection's writer. Called when the handler starts.
    pub async fn insert(&self, connection_id: ConnectionId, writer: PeerWriter) {
        let mut peers = self.inner.write().await;
        peers.insert(connection_id, writer);
    }

    /// Drops a connection's writer. Called on disconnect.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        let mut peers = self.inner.write().await;
        if peers.remove(connection_id).is_some() {
            debug!(connection_id = %connection_id, "Removed peer writer");
        }
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Sends one message to one connection.
    ///
    /// Returns `false` when the connection is not live or the write failed;
    /// a failed writer is evicted so later sends miss fast. Callers decide
    /// whether a miss matters - for signaling and presence it never does.
    pub async fn send(&self, connection_id: &ConnectionId, message: &ServerMessage) -> bool {
        let writer = {
            let peers = self.inner.read().await;
            match peers.get(connection_id) {
                Some(writer) => Arc::clone(writer),
                None => return false,
            }
        };

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        if write_frame(&writer, &json).await {
            return true;
        }

        debug!(connection_id = %connection_id, "Evicting failed peer writer");
        self.remove(connection_id).await;
        false
    }

    /// Sends one message to many connections, serializing once.
    pub async fn send_many(&self, connection_ids: &[ConnectionId], message: &ServerMessage) {
        if connection_ids.is_empty() {
            return;
        }

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                return;
            }
        };

        let mut failed = Vec::new();
        {
            let peers = self.inner.read().await;
            for connection_id in connection_ids {
                let Some(writer) = peers.get(connection_id) else {
                    continue;
                };
                if !write_frame(writer, &json).await {
                    failed.push(connection_id.clone());
                }
            }
        }

        // Evict failures outside the read lock.
        for connection_id in failed {
            debug!(connection_id = %connection_id, "Evicting failed peer writer");
            self.remove(&connection_id).await;
        }
    }
}

/// Writes one newline-terminated frame with a timeout.
async fn write_frame(writer: &PeerWriter, json: &str) -> bool {
    let mut writer = writer.lock().await;
    let result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await;

    matches!(result, Ok(Ok(())))
}
