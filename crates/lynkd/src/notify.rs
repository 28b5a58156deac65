//! Notification dispatch.
//!
//! Persist first, then live push, then external device push. The two push
//! channels are independent, not an either/or: a user live on their laptop
//! still wants the phone to buzz.

use std::sync::Arc;

use tracing::{debug, info, warn};

use lynk_core::{ConnectionId, NotificationDraft, NotificationId};
use lynk_protocol::ServerMessage;

use crate::delivery::PeerMap;
use crate::registry::RegistryHandle;
use crate::store::{NotificationStore, PushProvider, SubscriptionStore};

/// Persists notifications and delivers them over every channel available.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    push: Arc<dyn PushProvider>,
    subscriptions: Arc<dyn SubscriptionStore>,
    registry: RegistryHandle,
    peers: PeerMap,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        push: Arc<dyn PushProvider>,
        subscriptions: Arc<dyn SubscriptionStore>,
        registry: RegistryHandle,
        peers: PeerMap,
    ) -> Self {
        Self {
            store,
            push,
            subscriptions,
            registry,
            peers,
        }
    }

    /// Dispatches one notification submitted by the connection `origin`.
    ///
    /// 1. Persist. On failure the origin gets `notification_error` and the
    ///    dispatch is over.
    /// 2. Resolve the recipient after the persistence await and emit
    ///    `new_notification` if they are live.
    /// 3. Attempt device push when a subscription exists, regardless of live
    ///    delivery. An `expired` outcome clears the subscription; no push
    ///    outcome ever fails the dispatch.
    pub async fn dispatch(&self, draft: NotificationDraft, origin: &ConnectionId) {
        let recipient = draft.user_id.clone();

        let notification = match self.store.save(draft).await {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, connection_id = %origin, "Notification persistence failed");
                self.peers
                    .send(origin, &ServerMessage::notification_error(&e.to_string()))
                    .await;
                return;
            }
        };

        debug!(
            notification_id = %notification.id,
            user_id = %recipient,
            "Notification persisted"
        );

        if let Some(connection_id) = self.registry.resolve(&recipient).await {
            self.peers
                .send(
                    &connection_id,
                    &ServerMessage::new_notification(notification.clone()),
                )
                .await;
        } else {
            debug!(user_id = %recipient, "Recipient offline, relying on device push");
        }

        let Some(subscription) = self.subscriptions.subscription_for(&recipient).await else {
            return;
        };

        let outcome = self.push.send(&subscription, &notification).await;
        if outcome.is_expired() {
            info!(user_id = %recipient, "Push subscription expired, clearing");
            if let Err(e) = self.subscriptions.clear(&recipient).await {
                warn!(error = %e, user_id = %recipient, "Failed to clear expired subscription");
            }
        } else if !outcome.success {
            debug!(
                user_id = %recipient,
                failure = ?outcome.failure,
                "Device push not delivered"
            );
        }
    }

    /// Marks a stored notification as read and echoes the updated record to
    /// the connection `origin`.
    pub async fn mark_read(&self, id: &NotificationId, origin: &ConnectionId) {
        match self.store.mark_read(id).await {
            Ok(notification) => {
                self.peers
                    .send(origin, &ServerMessage::notification_read(notification))
                    .await;
            }
            Err(e) => {
                warn!(error = %e, notification_id = %id, "Failed to mark notification read");
                self.peers
                    .send(origin, &ServerMessage::notification_error(&e.to_string()))
                    .await;
            }
        }
    }
}
