//! In-process store backends.
//!
//! Used as the default wiring of the single-process deployment and by the
//! test suite. Durable backends implement the same traits elsewhere.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use lynk_core::{
    Message, MessageDraft, MessageId, Notification, NotificationDraft, NotificationId,
    NotificationStatus, UserId,
};

use super::{
    MessageStore, NotificationStore, PushFailure, PushOutcome, PushProvider, PushSubscription,
    StoreError, SubscriptionStore,
};

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Persistence("store lock poisoned".to_string())
}

/// Message store backed by a `Vec` under a mutex.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages (test introspection).
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn save(&self, draft: MessageDraft) -> Result<Message, StoreError> {
        let message = Message {
            id: MessageId::new(Uuid::new_v4().to_string()),
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content,
            message_type: draft.message_type,
            created_at: Utc::now(),
            is_read: false,
            deleted_for: Vec::new(),
        };

        let mut messages = self.messages.lock().map_err(poisoned)?;
        messages.push(message.clone());
        Ok(message)
    }

    async fn query(
        &self,
        user_id: &UserId,
        target_user_id: &UserId,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.lock().map_err(poisoned)?;
        Ok(messages
            .iter()
            .filter(|m| {
                (m.sender_id == *user_id && m.receiver_id == *target_user_id)
                    || (m.sender_id == *target_user_id && m.receiver_id == *user_id)
            })
            .filter(|m| !m.is_deleted_for(user_id))
            .cloned()
            .collect())
    }
}

/// Notification store backed by a `Vec` under a mutex.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn save(&self, draft: NotificationDraft) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: NotificationId::new(Uuid::new_v4().to_string()),
            user_id: draft.user_id,
            title: draft.title,
            message: draft.message,
            kind: draft.kind,
            status: NotificationStatus::Unread,
            priority: draft.priority,
            created_at: Utc::now(),
        };

        let mut notifications = self.notifications.lock().map_err(poisoned)?;
        notifications.push(notification.clone());
        Ok(notification)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<Notification, StoreError> {
        let mut notifications = self.notifications.lock().map_err(poisoned)?;
        let notification = notifications
            .iter_mut()
            .find(|n| n.id == *id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        notification.status = NotificationStatus::Read;
        Ok(notification.clone())
    }
}

/// Push provider used when no real provider is configured.
///
/// Every send reports the `disabled` outcome, which the dispatcher treats as
/// a quiet miss.
#[derive(Debug, Default)]
pub struct NoopPushProvider;

#[async_trait]
impl PushProvider for NoopPushProvider {
    async fn send(&self, subscription: &PushSubscription, _: &Notification) -> PushOutcome {
        debug!(endpoint = %subscription.endpoint, "Push delivery disabled, skipping");
        PushOutcome::failed(PushFailure::Disabled)
    }
}

/// Push provider that records every send and answers with a configurable
/// outcome. Backs the dispatcher tests.
#[derive(Debug)]
pub struct RecordingPushProvider {
    outcome: Mutex<PushOutcome>,
    sent: Mutex<Vec<(String, NotificationId)>>,
}

impl Default for RecordingPushProvider {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(PushOutcome::delivered()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingPushProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(outcome: PushOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_outcome(&self, outcome: PushOutcome) {
        if let Ok(mut guard) = self.outcome.lock() {
            *guard = outcome;
        }
    }

    /// Endpoints and notification ids of every attempted send.
    pub fn sent(&self) -> Vec<(String, NotificationId)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushProvider for RecordingPushProvider {
    async fn send(&self, subscription: &PushSubscription, notification: &Notification) -> PushOutcome {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((subscription.endpoint.clone(), notification.id.clone()));
        }
        self.outcome
            .lock()
            .map(|o| *o)
            .unwrap_or(PushOutcome::failed(PushFailure::Other))
    }
}

/// Subscription store backed by a map under a mutex.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Mutex<HashMap<UserId, PushSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, subscription: PushSubscription) {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.insert(user_id, subscription);
        }
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.subscriptions
            .lock()
            .map(|subs| subs.contains_key(user_id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn subscription_for(&self, user_id: &UserId) -> Option<PushSubscription> {
        self.subscriptions
            .lock()
            .ok()
            .and_then(|subs| subs.get(user_id).cloned())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), StoreError> {
        let mut subs = self.subscriptions.lock().map_err(poisoned)?;
        subs.remove(user_id);
        Ok(())
    }
}
