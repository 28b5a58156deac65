//! Integration tests for the TCP gateway server.
//!
//! These tests exercise the gateway as a complete system over real sockets:
//! identification, direct-message routing, room presence, call signaling,
//! notification dispatch, and graceful shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - the panic-free policy applies
//! to production code, which these assertions exercise.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lynk_core::{MessageDraft, NotificationDraft, UserId};
use lynk_protocol::{ClientEvent, ClientMessage, ProtocolVersion, ServerMessage};
use lynkd::registry::{spawn_registry, RegistryHandle};
use lynkd::server::GatewayServer;
use lynkd::store::{
    GatewayStores, MemoryMessageStore, MemoryNotificationStore, MemorySubscriptionStore,
    MessageStore, PushFailure, PushOutcome, PushSubscription, RecordingPushProvider, StoreError,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for an expected frame
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Time after which we declare "no frame arrived"
const SILENCE_WINDOW: Duration = Duration::from_millis(250);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

/// Gateway under test, with handles into its stores for assertions.
struct TestHarness {
    addr: SocketAddr,
    cancel_token: CancellationToken,
    registry: RegistryHandle,
    messages: Arc<MemoryMessageStore>,
    notifications: Arc<MemoryNotificationStore>,
    push: Arc<RecordingPushProvider>,
    subscriptions: Arc<MemorySubscriptionStore>,
}

impl TestHarness {
    /// Spawns a gateway on an ephemeral port with in-memory stores.
    async fn spawn() -> Self {
        let messages = Arc::new(MemoryMessageStore::new());
        let notifications = Arc::new(MemoryNotificationStore::new());
        let push = Arc::new(RecordingPushProvider::new());
        let subscriptions = Arc::new(MemorySubscriptionStore::new());

        let stores = GatewayStores {
            messages: messages.clone(),
            notifications: notifications.clone(),
            push: push.clone(),
            subscriptions: subscriptions.clone(),
        };

        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();

        let server = GatewayServer::bind("127.0.0.1:0", registry.clone(), stores, cancel_token.clone())
            .await
            .expect("bind gateway");
        let addr = server.local_addr().expect("bound address");

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            cancel_token,
            registry,
            messages,
            notifications,
            push,
            subscriptions,
        }
    }

    /// Creates a client connection to the gateway.
    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to gateway");
        TestClient::new(stream)
    }

    /// Connects and identifies as `user_id`, returning the client and its
    /// assigned connection id.
    async fn connect_as(&self, user_id: &str) -> (TestClient, String) {
        let mut client = self.connect().await;
        client.send(ClientMessage::join(user_id)).await;
        let connection_id = match client.recv().await {
            ServerMessage::Connected { connection_id, .. } => connection_id.as_str().to_string(),
            other => panic!("Expected Connected, got {other:?}"),
        };
        (client, connection_id)
    }

    /// Shuts down the gateway gracefully.
    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

/// Test client connection with protocol helpers.
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Sends a message to the gateway.
    async fn send(&mut self, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        self.writer.write_all(json.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Sends a raw line (for malformed-frame tests).
    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives the next frame, failing the test after `RECV_TIMEOUT`.
    async fn recv(&mut self) -> ServerMessage {
        let mut line = String::new();
        timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for frame")
            .expect("read frame");
        serde_json::from_str(&line).unwrap_or_else(|e| panic!("bad frame {line:?}: {e}"))
    }

    /// Returns `None` when nothing arrives within the silence window.
    async fn try_recv(&mut self) -> Option<ServerMessage> {
        let mut line = String::new();
        match timeout(SILENCE_WINDOW, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => None,
            Ok(Ok(_)) => Some(serde_json::from_str(&line).unwrap()),
            _ => None,
        }
    }
}

/// Waits until `probe` returns true, failing the test on timeout.
async fn wait_until<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < RECV_TIMEOUT {
        if probe().await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within {RECV_TIMEOUT:?}");
}

// ============================================================================
// Identification Tests
// ============================================================================

#[tokio::test]
async fn test_join_assigns_connection_id() {
    let harness = TestHarness::spawn().await;
    let mut client = harness.connect().await;

    client.send(ClientMessage::join("u1")).await;

    match client.recv().await {
        ServerMessage::Connected {
            protocol_version,
            connection_id,
        } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
            assert!(connection_id.as_str().starts_with("conn-"));
        }
        other => panic!("Expected Connected, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_version_mismatch_rejected() {
    let harness = TestHarness::spawn().await;
    let mut client = harness.connect().await;

    let msg = ClientMessage {
        protocol_version: ProtocolVersion::new(99, 0),
        event: ClientEvent::Ping { seq: 1 },
    };
    client.send(msg).await;

    match client.recv().await {
        ServerMessage::Rejected { reason, .. } => {
            assert!(
                reason.contains("not compatible"),
                "Expected 'not compatible' in reason, got: {reason}"
            );
        }
        other => panic!("Expected Rejected, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_ping_pong() {
    let harness = TestHarness::spawn().await;
    let mut client = harness.connect().await;

    client.send(ClientMessage::ping(42)).await;

    match client.recv().await {
        ServerMessage::Pong { seq } => assert_eq!(seq, 42),
        other => panic!("Expected Pong, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_alive() {
    let harness = TestHarness::spawn().await;
    let mut client = harness.connect().await;

    // Valid first frame so the version gate passes.
    client.send(ClientMessage::ping(1)).await;
    let _ = client.recv().await;

    client.send_raw("this is not json").await;

    match client.recv().await {
        ServerMessage::Error { message } => {
            assert!(message.contains("invalid message"));
        }
        other => panic!("Expected Error, got {other:?}"),
    }

    // The connection still works.
    client.send(ClientMessage::ping(2)).await;
    assert!(matches!(client.recv().await, ServerMessage::Pong { seq: 2 }));

    harness.shutdown().await;
}

// ============================================================================
// Direct Message Routing
// ============================================================================

#[tokio::test]
async fn test_message_delivered_to_live_receiver() {
    // Scenario: alice and bob are both online; alice messages bob.
    let harness = TestHarness::spawn().await;
    let (mut alice, _) = harness.connect_as("u1").await;
    let (mut bob, _) = harness.connect_as("u2").await;

    alice
        .send(ClientMessage::send_message(MessageDraft::text(
            "u1", "u2", "hi",
        )))
        .await;

    // Sender ack carries the persisted record with a generated id.
    let sent_id = match alice.recv().await {
        ServerMessage::MessageSent { message } => {
            assert_eq!(message.content, "hi");
            assert!(!message.id.as_str().is_empty());
            message.id
        }
        other => panic!("Expected MessageSent, got {other:?}"),
    };

    // Receiver gets the same record live.
    match bob.recv().await {
        ServerMessage::NewMessage { message } => {
            assert_eq!(message.id, sent_id);
            assert_eq!(message.content, "hi");
            assert_eq!(message.sender_id, UserId::new("u1"));
        }
        other => panic!("Expected NewMessage, got {other:?}"),
    }

    // The store saw the save.
    assert_eq!(harness.messages.len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_message_to_offline_receiver_is_stored_only() {
    // Scenario: the receiver has never registered.
    let harness = TestHarness::spawn().await;
    let (mut alice, _) = harness.connect_as("u1").await;

    alice
        .send(ClientMessage::send_message(MessageDraft::text(
            "u1", "u3", "are you there",
        )))
        .await;

    assert!(matches!(
        alice.recv().await,
        ServerMessage::MessageSent { .. }
    ));

    // Pull-based catch-up finds it later.
    let stored = harness
        .messages
        .query(&UserId::new("u1"), &UserId::new("u3"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "are you there");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_self_message_is_routed() {
    let harness = TestHarness::spawn().await;
    let (mut alice, _) = harness.connect_as("u1").await;

    alice
        .send(ClientMessage::send_message(MessageDraft::text(
            "u1", "u1", "note to self",
        )))
        .await;

    assert!(matches!(
        alice.recv().await,
        ServerMessage::MessageSent { .. }
    ));
    match alice.recv().await {
        ServerMessage::NewMessage { message } => {
            assert_eq!(message.content, "note to self");
        }
        other => panic!("Expected NewMessage, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_fetch_messages_returns_history() {
    let harness = TestHarness::spawn().await;
    let (mut alice, _) = harness.connect_as("u1").await;

    for content in ["one", "two"] {
        alice
            .send(ClientMessage::send_message(MessageDraft::text(
                "u1", "u3", content,
            )))
            .await;
        let _ = alice.recv().await;
    }

    alice.send(ClientMessage::fetch_messages("u1", "u3")).await;

    match alice.recv().await {
        ServerMessage::MessageHistory { messages } => {
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].content, "one");
            assert_eq!(messages[1].content, "two");
        }
        other => panic!("Expected MessageHistory, got {other:?}"),
    }

    harness.shutdown().await;
}

/// Message store whose writes always fail.
struct FailingMessageStore;

#[async_trait]
impl MessageStore for FailingMessageStore {
    async fn save(&self, _: MessageDraft) -> Result<lynk_core::Message, StoreError> {
        Err(StoreError::Persistence("disk unavailable".to_string()))
    }

    async fn query(
        &self,
        _: &UserId,
        _: &UserId,
    ) -> Result<Vec<lynk_core::Message>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_persistence_failure_emits_error_and_no_delivery() {
    // Durability precedes delivery: when the store rejects the write, the
    // sender sees message_error and the receiver sees nothing.
    let registry = spawn_registry();
    let cancel_token = CancellationToken::new();
    let stores = GatewayStores {
        messages: Arc::new(FailingMessageStore),
        notifications: Arc::new(MemoryNotificationStore::new()),
        push: Arc::new(RecordingPushProvider::new()),
        subscriptions: Arc::new(MemorySubscriptionStore::new()),
    };
    let server = GatewayServer::bind("127.0.0.1:0", registry, stores, cancel_token.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let mut alice = TestClient::new(TcpStream::connect(addr).await.unwrap());
    alice.send(ClientMessage::join("u1")).await;
    let _ = alice.recv().await;

    let mut bob = TestClient::new(TcpStream::connect(addr).await.unwrap());
    bob.send(ClientMessage::join("u2")).await;
    let _ = bob.recv().await;

    alice
        .send(ClientMessage::send_message(MessageDraft::text(
            "u1", "u2", "doomed",
        )))
        .await;

    match alice.recv().await {
        ServerMessage::MessageError { reason } => {
            assert!(reason.contains("disk unavailable"));
        }
        other => panic!("Expected MessageError, got {other:?}"),
    }

    assert!(bob.try_recv().await.is_none(), "no live event on failed save");

    cancel_token.cancel();
}

// ============================================================================
// Room Presence
// ============================================================================

#[tokio::test]
async fn test_join_meeting_flow() {
    // Scenario: u1 then u2 join room-42.
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("room-42", "u1", "alice"))
        .await;
    match alice.recv().await {
        ServerMessage::ExistingUsers { users } => assert!(users.is_empty()),
        other => panic!("Expected ExistingUsers, got {other:?}"),
    }

    bob.send(ClientMessage::join_meeting("room-42", "u2", "bob"))
        .await;

    // Bob's join response names exactly alice.
    match bob.recv().await {
        ServerMessage::ExistingUsers { users } => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].user_id, UserId::new("u1"));
            assert_eq!(users[0].display_name, "alice");
        }
        other => panic!("Expected ExistingUsers, got {other:?}"),
    }

    // Alice hears about bob.
    match alice.recv().await {
        ServerMessage::UserJoined { id, username, .. } => {
            assert_eq!(id, UserId::new("u2"));
            assert_eq!(username, "bob");
        }
        other => panic!("Expected UserJoined, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_join_meeting_identifies_connection() {
    // join-meeting without a prior join still registers the user.
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("room-42", "u1", "alice"))
        .await;
    let _ = alice.recv().await;

    let registry = harness.registry.clone();
    wait_until(move || {
        let registry = registry.clone();
        async move { registry.resolve(&UserId::new("u1")).await.is_some() }
    })
    .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_leave_meeting_broadcasts_user_left() {
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("r1", "u1", "alice"))
        .await;
    let _ = alice.recv().await;
    bob.send(ClientMessage::join_meeting("r1", "u2", "bob")).await;
    let _ = bob.recv().await;
    let _ = alice.recv().await; // user-joined for bob

    bob.send(ClientMessage::leave_meeting("r1", "u2")).await;

    match alice.recv().await {
        ServerMessage::UserLeft { id } => assert_eq!(id, UserId::new("u2")),
        other => panic!("Expected UserLeft, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_cleans_room_and_notifies() {
    // Scenario: bob drops the transport without leaving room r1.
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("r1", "u1", "alice"))
        .await;
    let _ = alice.recv().await;
    bob.send(ClientMessage::join_meeting("r1", "u2", "bob")).await;
    let _ = bob.recv().await;
    let _ = alice.recv().await; // user-joined for bob

    drop(bob);

    match alice.recv().await {
        ServerMessage::UserLeft { id } => assert_eq!(id, UserId::new("u2")),
        other => panic!("Expected UserLeft, got {other:?}"),
    }

    // The room no longer lists u2, and u2 is no longer resolvable.
    let participants = harness.registry.participants(&"r1".into()).await;
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].user_id, UserId::new("u1"));
    assert!(harness.registry.resolve(&UserId::new("u2")).await.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_room_chat_broadcast() {
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("r1", "u1", "alice"))
        .await;
    let _ = alice.recv().await;
    bob.send(ClientMessage::join_meeting("r1", "u2", "bob")).await;
    let _ = bob.recv().await;
    let _ = alice.recv().await;

    alice
        .send(ClientMessage::room_message("r1", "alice", "hi all"))
        .await;

    for client in [&mut alice, &mut bob] {
        match client.recv().await {
            ServerMessage::ReceiveMessage {
                username, message, ..
            } => {
                assert_eq!(username, "alice");
                assert_eq!(message, "hi all");
            }
            other => panic!("Expected ReceiveMessage, got {other:?}"),
        }
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_room_chat_rejects_non_member() {
    let harness = TestHarness::spawn().await;
    let (mut mallory, _) = harness.connect_as("u9").await;

    mallory
        .send(ClientMessage::room_message("r1", "mallory", "let me in"))
        .await;

    match mallory.recv().await {
        ServerMessage::Error { message } => assert!(message.contains("not in this room")),
        other => panic!("Expected Error, got {other:?}"),
    }

    harness.shutdown().await;
}

// ============================================================================
// Call Signaling
// ============================================================================

#[tokio::test]
async fn test_signal_relayed_between_connections() {
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("r1", "u1", "alice"))
        .await;
    let _ = alice.recv().await;
    bob.send(ClientMessage::join_meeting("r1", "u2", "bob")).await;

    // Bob learns alice's connection id from the join response.
    let alice_conn = match bob.recv().await {
        ServerMessage::ExistingUsers { users } => users[0].connection_id.clone(),
        other => panic!("Expected ExistingUsers, got {other:?}"),
    };
    let bob_conn = match alice.recv().await {
        ServerMessage::UserJoined { connection_id, .. } => connection_id,
        other => panic!("Expected UserJoined, got {other:?}"),
    };

    bob.send(ClientMessage::signal(
        alice_conn.as_str(),
        serde_json::json!({"sdp": "offer-blob"}),
    ))
    .await;

    match alice.recv().await {
        ServerMessage::Signal { from, signal } => {
            assert_eq!(from, bob_conn);
            assert_eq!(signal["sdp"], "offer-blob");
        }
        other => panic!("Expected Signal, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_ice_candidate_relayed() {
    let harness = TestHarness::spawn().await;
    let (mut alice, alice_conn) = harness.connect_as("u1").await;
    let (mut bob, _) = harness.connect_as("u2").await;

    bob.send(ClientMessage::ice_candidate(
        alice_conn.as_str(),
        serde_json::json!({"candidate": "candidate:1 1 UDP"}),
    ))
    .await;

    match alice.recv().await {
        ServerMessage::IceCandidate { candidate, .. } => {
            assert_eq!(candidate["candidate"], "candidate:1 1 UDP");
        }
        other => panic!("Expected IceCandidate, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_signal_to_unknown_target_is_dropped_silently() {
    // Best-effort: no event to anyone, no error back, connection unharmed.
    let harness = TestHarness::spawn().await;
    let (mut alice, _) = harness.connect_as("u1").await;

    alice
        .send(ClientMessage::signal(
            "conn-999",
            serde_json::json!({"sdp": "into the void"}),
        ))
        .await;

    assert!(alice.try_recv().await.is_none());

    alice.send(ClientMessage::ping(5)).await;
    assert!(matches!(alice.recv().await, ServerMessage::Pong { seq: 5 }));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_screen_share_updates_room_and_broadcasts() {
    let harness = TestHarness::spawn().await;
    let mut alice = harness.connect().await;
    let mut bob = harness.connect().await;

    alice
        .send(ClientMessage::join_meeting("r1", "u1", "alice"))
        .await;
    let _ = alice.recv().await;
    bob.send(ClientMessage::join_meeting("r1", "u2", "bob")).await;
    let _ = bob.recv().await;
    let _ = alice.recv().await;

    alice
        .send(ClientMessage::new(ClientEvent::StartScreenShare {
            room_id: "r1".into(),
            user_id: "u1".into(),
        }))
        .await;

    match bob.recv().await {
        ServerMessage::ScreenShareStarted { room_id, user_id } => {
            assert_eq!(room_id.as_str(), "r1");
            assert_eq!(user_id, UserId::new("u1"));
        }
        other => panic!("Expected ScreenShareStarted, got {other:?}"),
    }

    // Room state reflects the share for later queries.
    let participants = harness.registry.participants(&"r1".into()).await;
    let alice_state = participants
        .iter()
        .find(|p| p.user_id == UserId::new("u1"))
        .unwrap();
    assert!(alice_state.screen_sharing);

    alice
        .send(ClientMessage::new(ClientEvent::StopScreenShare {
            room_id: "r1".into(),
            user_id: "u1".into(),
        }))
        .await;

    assert!(matches!(
        bob.recv().await,
        ServerMessage::ScreenShareStopped { .. }
    ));

    harness.shutdown().await;
}

// ============================================================================
// Notifications
// ============================================================================

fn notification_draft(user: &str) -> NotificationDraft {
    NotificationDraft {
        user_id: UserId::new(user),
        title: "New follower".to_string(),
        message: "carol started following you".to_string(),
        kind: Default::default(),
        priority: Default::default(),
    }
}

#[tokio::test]
async fn test_notification_delivered_live() {
    let harness = TestHarness::spawn().await;
    let (mut carol, _) = harness.connect_as("u3").await;
    let (mut producer, _) = harness.connect_as("u1").await;

    producer
        .send(ClientMessage::send_notification(notification_draft("u3")))
        .await;

    match carol.recv().await {
        ServerMessage::NewNotification { notification } => {
            assert_eq!(notification.title, "New follower");
            assert!(notification.is_unread());
        }
        other => panic!("Expected NewNotification, got {other:?}"),
    }

    assert_eq!(harness.notifications.len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_push_attempted_even_when_recipient_is_live() {
    // Live socket delivery and device push are independent channels.
    let harness = TestHarness::spawn().await;
    harness.subscriptions.insert(
        UserId::new("u3"),
        PushSubscription {
            endpoint: "https://push.example/u3".to_string(),
            p256dh: "key".to_string(),
            auth: "auth".to_string(),
        },
    );

    let (mut carol, _) = harness.connect_as("u3").await;
    let (mut producer, _) = harness.connect_as("u1").await;

    producer
        .send(ClientMessage::send_notification(notification_draft("u3")))
        .await;

    assert!(matches!(
        carol.recv().await,
        ServerMessage::NewNotification { .. }
    ));

    let push = harness.push.clone();
    wait_until(|| {
        let push = push.clone();
        async move { push.sent().len() == 1 }
    })
    .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_expired_push_subscription_is_cleared() {
    let harness = TestHarness::spawn().await;
    harness
        .push
        .set_outcome(PushOutcome::failed(PushFailure::Expired));
    harness.subscriptions.insert(
        UserId::new("u3"),
        PushSubscription {
            endpoint: "https://push.example/u3".to_string(),
            p256dh: "key".to_string(),
            auth: "auth".to_string(),
        },
    );

    // Recipient offline: device push is the only channel.
    let (mut producer, _) = harness.connect_as("u1").await;
    producer
        .send(ClientMessage::send_notification(notification_draft("u3")))
        .await;

    let subscriptions = harness.subscriptions.clone();
    wait_until(|| {
        let subscriptions = subscriptions.clone();
        async move { !subscriptions.contains(&UserId::new("u3")) }
    })
    .await;

    // The dispatch itself still succeeded.
    assert_eq!(harness.notifications.len(), 1);
    assert!(producer.try_recv().await.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_mark_notification_read() {
    let harness = TestHarness::spawn().await;
    let (mut carol, _) = harness.connect_as("u3").await;
    let (mut producer, _) = harness.connect_as("u1").await;

    producer
        .send(ClientMessage::send_notification(notification_draft("u3")))
        .await;

    let id = match carol.recv().await {
        ServerMessage::NewNotification { notification } => notification.id,
        other => panic!("Expected NewNotification, got {other:?}"),
    };

    carol
        .send(ClientMessage::mark_notification_read(id.as_str()))
        .await;

    match carol.recv().await {
        ServerMessage::NotificationRead { notification } => {
            assert!(!notification.is_unread());
        }
        other => panic!("Expected NotificationRead, got {other:?}"),
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_mark_unknown_notification_errors() {
    let harness = TestHarness::spawn().await;
    let (mut carol, _) = harness.connect_as("u3").await;

    carol
        .send(ClientMessage::mark_notification_read("does-not-exist"))
        .await;

    assert!(matches!(
        carol.recv().await,
        ServerMessage::NotificationError { .. }
    ));

    harness.shutdown().await;
}

// ============================================================================
// Reconnect & Shutdown
// ============================================================================

#[tokio::test]
async fn test_reconnect_takes_over_delivery() {
    let harness = TestHarness::spawn().await;
    let (mut old_bob, _) = harness.connect_as("u2").await;
    let (mut new_bob, _) = harness.connect_as("u2").await;
    let (mut alice, _) = harness.connect_as("u1").await;

    alice
        .send(ClientMessage::send_message(MessageDraft::text(
            "u1", "u2", "hello again",
        )))
        .await;
    let _ = alice.recv().await;

    match new_bob.recv().await {
        ServerMessage::NewMessage { message } => assert_eq!(message.content, "hello again"),
        other => panic!("Expected NewMessage, got {other:?}"),
    }
    assert!(old_bob.try_recv().await.is_none());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_graceful_shutdown_stops_accepting() {
    let harness = TestHarness::spawn().await;
    let addr = harness.addr;

    let mut client = harness.connect().await;
    client.send(ClientMessage::ping(1)).await;
    let _ = client.recv().await;

    harness.cancel_token.cancel();
    sleep(SHUTDOWN_GRACE_PERIOD).await;

    assert!(
        TcpStream::connect(addr).await.is_err(),
        "listener should be gone after shutdown"
    );
}

#[tokio::test]
async fn test_concurrent_clients() {
    let harness = TestHarness::spawn().await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let addr = harness.addr;
        handles.push(tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let mut client = TestClient::new(stream);
            client.send(ClientMessage::join(format!("user-{i}"))).await;
            matches!(client.recv().await, ServerMessage::Connected { .. })
        }));
    }

    for handle in handles {
        assert!(handle.await.expect("client task should succeed"));
    }

    harness.shutdown().await;
}
