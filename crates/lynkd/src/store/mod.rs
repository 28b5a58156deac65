//! External collaborator interfaces.
//!
//! The gateway persists nothing itself: messages and notifications go to
//! stores owned by the rest of the platform, and device push goes to an
//! external provider. These traits are the seams; `memory` provides the
//! in-process backends the single-process deployment and the tests run on.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use lynk_core::{Message, MessageDraft, Notification, NotificationDraft, NotificationId, UserId};

pub mod memory;

pub use memory::{
    MemoryMessageStore, MemoryNotificationStore, MemorySubscriptionStore, NoopPushProvider,
    RecordingPushProvider,
};

/// Errors surfaced by the stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store rejected or lost the write.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// The record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Durable message storage.
///
/// Persistence here is authoritative: the router only acknowledges a message
/// once `save` returned, and an offline receiver catches up later through
/// `query`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a draft, assigning id and timestamp.
    async fn save(&self, draft: MessageDraft) -> Result<Message, StoreError>;

    /// The conversation between two users, oldest first, excluding messages
    /// the querying `user_id` deleted for themselves.
    async fn query(&self, user_id: &UserId, target_user_id: &UserId)
        -> Result<Vec<Message>, StoreError>;
}

/// Durable notification storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persists a draft, assigning id, timestamp, and unread status.
    async fn save(&self, draft: NotificationDraft) -> Result<Notification, StoreError>;

    /// Flips a notification to read and returns the updated record.
    async fn mark_read(&self, id: &NotificationId) -> Result<Notification, StoreError>;
}

/// A device push endpoint registered by a user's browser or phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Why a push delivery did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushFailure {
    /// The provider says the subscription is permanently gone; the
    /// dispatcher clears it.
    Expired,
    /// Malformed or unknown subscription.
    Invalid,
    /// Provider throttled the send.
    RateLimited,
    /// Push delivery is not configured on this deployment.
    Disabled,
    /// Anything else.
    Other,
}

/// Result of one push delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub success: bool,
    pub failure: Option<PushFailure>,
}

impl PushOutcome {
    pub fn delivered() -> Self {
        Self {
            success: true,
            failure: None,
        }
    }

    pub fn failed(failure: PushFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
        }
    }

    /// True when the subscription should be cleaned up.
    pub fn is_expired(&self) -> bool {
        self.failure == Some(PushFailure::Expired)
    }
}

/// External push-notification delivery (web push, APNs, ...).
///
/// Send failures are outcomes, not errors: the dispatcher reacts to the
/// reason but a failed push never fails the dispatch.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, notification: &Notification)
        -> PushOutcome;
}

/// Lookup and cleanup of per-user push subscriptions (owned by the platform's
/// user store).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn subscription_for(&self, user_id: &UserId) -> Option<PushSubscription>;

    /// Drops a subscription the provider reported as permanently invalid.
    async fn clear(&self, user_id: &UserId) -> Result<(), StoreError>;
}

/// The full set of collaborators the gateway is wired with.
#[derive(Clone)]
pub struct GatewayStores {
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub push: Arc<dyn PushProvider>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl GatewayStores {
    /// In-process backends: the default for the single-process deployment.
    pub fn in_memory() -> Self {
        Self {
            messages: Arc::new(MemoryMessageStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
            push: Arc::new(NoopPushProvider),
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
        }
    }
}
