//! Direct-message routing.
//!
//! Persistence is authoritative, live delivery is a best-effort accelerant:
//! a message exists once the store accepted it, and an offline receiver
//! catches up later through the store's query interface. There is no
//! queued-push-on-reconnect.

use std::sync::Arc;

use tracing::{debug, warn};

use lynk_core::{ConnectionId, MessageDraft, UserId};
use lynk_protocol::ServerMessage;

use crate::delivery::PeerMap;
use crate::registry::RegistryHandle;
use crate::store::MessageStore;

/// Routes direct messages: persist, ack the sender, forward to the receiver
/// if live.
pub struct MessageRouter {
    store: Arc<dyn MessageStore>,
    registry: RegistryHandle,
    peers: PeerMap,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn MessageStore>, registry: RegistryHandle, peers: PeerMap) -> Self {
        Self {
            store,
            registry,
            peers,
        }
    }

    /// Routes one message from the connection `sender`.
    ///
    /// 1. Persist. On failure the sender gets `message_error` and nothing
    ///    else happens - the message was not sent.
    /// 2. Ack the sender with the persisted record (it carries the store id).
    /// 3. Resolve the receiver and forward if live. The lookup happens after
    ///    the persistence await, never from a snapshot taken before it: the
    ///    receiver may have disconnected while the store call was in flight.
    ///
    /// Self-addressed messages (`sender == receiver`) are routed like any
    /// other conversation.
    pub async fn route(&self, draft: MessageDraft, sender: &ConnectionId) {
        let receiver_id = draft.receiver_id.clone();

        let message = match self.store.save(draft).await {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, connection_id = %sender, "Message persistence failed");
                self.peers
                    .send(sender, &ServerMessage::message_error(&e.to_string()))
                    .await;
                return;
            }
        };

        debug!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            receiver_id = %message.receiver_id,
            "Message persisted"
        );

        self.peers
            .send(sender, &ServerMessage::message_sent(message.clone()))
            .await;

        match self.registry.resolve(&receiver_id).await {
            Some(connection_id) => {
                self.peers
                    .send(&connection_id, &ServerMessage::new_message(message))
                    .await;
            }
            None => {
                // Not an error: the receiver pulls the conversation from the
                // store whenever they come back.
                debug!(receiver_id = %receiver_id, "Receiver offline, stored only");
            }
        }
    }

    /// Answers a history fetch from the connection `requester`.
    pub async fn history(
        &self,
        user_id: &UserId,
        target_user_id: &UserId,
        requester: &ConnectionId,
    ) {
        match self.store.query(user_id, target_user_id).await {
            Ok(messages) => {
                self.peers
                    .send(requester, &ServerMessage::message_history(messages))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, connection_id = %requester, "History query failed");
                self.peers
                    .send(requester, &ServerMessage::message_error(&e.to_string()))
                    .await;
            }
        }
    }
}
