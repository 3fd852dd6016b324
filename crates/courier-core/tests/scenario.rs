use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use courier_core::credentials::{CredentialService, JwtCredentials};
use courier_core::memory::MemoryStore;
use courier_core::notify::{OfflineNotice, OfflineNotifier};
use courier_core::registry::ConnectionHandle;
use courier_core::{ChatError, ChatServices};
use courier_types::api::{ErrorKind, FriendDecision};
use courier_types::events::GatewayEvent;
use courier_types::models::{FriendshipStatus, MessageStatus};

#[derive(Default)]
struct CollectingNotifier {
    notices: Mutex<Vec<OfflineNotice>>,
}

#[async_trait::async_trait]
impl OfflineNotifier for CollectingNotifier {
    async fn notify(&self, notice: OfflineNotice) -> anyhow::Result<()> {
        self.notices.lock().await.push(notice);
        Ok(())
    }
}

fn services() -> (ChatServices, Arc<CollectingNotifier>) {
    let notifier = Arc::new(CollectingNotifier::default());
    let credentials = Arc::new(JwtCredentials::new(
        "scenario-secret",
        chrono::Duration::hours(1),
    ));
    let services = ChatServices::new(Arc::new(MemoryStore::new()), credentials, notifier.clone());
    (services, notifier)
}

async fn connect(
    services: &ChatServices,
    user_id: Uuid,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<GatewayEvent>) {
    let (handle, rx) = ConnectionHandle::new();
    services.registry.register(user_id, handle.clone()).await;
    services.presence.user_online(user_id).await;
    (handle, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> GatewayEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

#[tokio::test]
async fn alice_and_bob_end_to_end() {
    let (services, notifier) = services();

    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let bob = services.accounts.register("bob", "password-b").await.unwrap();
    assert_eq!(
        services.credentials.verify_token(&alice.token).map(|c| c.sub),
        Some(alice.user_id)
    );

    // alice is online for the whole scenario
    let (_alice_handle, mut alice_rx) = connect(&services, alice.user_id).await;

    let request = services
        .friends
        .request_friendship(alice.user_id, "bob")
        .await
        .unwrap();
    let pending = services.friends.list_pending(bob.user_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request.id);
    assert_eq!(pending[0].requester.username, "alice");

    services
        .friends
        .respond(request.id, bob.user_id, FriendDecision::Accept)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut alice_rx).await,
        GatewayEvent::FriendRequestResolved {
            request_id: request.id,
            user_id: bob.user_id,
            status: FriendshipStatus::Accepted,
        }
    );

    let alice_friends = services.friends.list_friends(alice.user_id).await.unwrap();
    let bob_friends = services.friends.list_friends(bob.user_id).await.unwrap();
    assert_eq!(alice_friends.len(), 1);
    assert_eq!(alice_friends[0].user.id, bob.user_id);
    assert!(!alice_friends[0].user.online);
    assert_eq!(bob_friends.len(), 1);
    assert_eq!(bob_friends[0].user.id, alice.user_id);
    assert!(bob_friends[0].user.online);

    // bob is offline: persisted as sent, offline hook fires
    let sent = services
        .delivery
        .send(alice.user_id, bob.user_id, "hi")
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    let notice = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(n) = notifier.notices.lock().await.first().cloned() {
                return n;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(notice.receiver_id, bob.user_id);
    assert_eq!(notice.sender_username, "alice");
    assert_eq!(notice.preview, "hi");

    let (_bob_handle, mut bob_rx) = connect(&services, bob.user_id).await;
    assert_eq!(
        next_event(&mut alice_rx).await,
        GatewayEvent::FriendOnline {
            user_id: bob.user_id
        }
    );

    // Fetching history does not mark anything delivered
    let history = services
        .delivery
        .get_conversation(bob.user_id, alice.user_id, None, 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, MessageStatus::Sent);
    assert!(bob_rx.try_recv().is_err());

    let read = services
        .delivery
        .mark_read(sent.id, bob.user_id)
        .await
        .unwrap();
    assert_eq!(read.status, MessageStatus::Read);
    assert!(read.read_at.is_some());
    assert_eq!(
        next_event(&mut alice_rx).await,
        GatewayEvent::MessageStatusUpdate {
            message_id: sent.id,
            status: MessageStatus::Read,
        }
    );

    // Second read is a no-op with no extra event
    let again = services
        .delivery
        .mark_read(sent.id, bob.user_id)
        .await
        .unwrap();
    assert_eq!(again.read_at, read.read_at);
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn strangers_cannot_message() {
    let (services, _) = services();
    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let mallory = services.accounts.register("mallory", "password-m").await.unwrap();

    let err = services
        .delivery
        .send(alice.user_id, mallory.user_id, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFriends));
    assert_eq!(err.kind(), ErrorKind::NotFriends);

    let history = services
        .delivery
        .get_conversation(alice.user_id, mallory.user_id, None, 0)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn crossing_friend_requests_only_one_wins() {
    let (services, _) = services();
    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let bob = services.accounts.register("bob", "password-b").await.unwrap();

    let a = {
        let services = services.clone();
        tokio::spawn(async move {
            services
                .friends
                .request_friendship(alice.user_id, "bob")
                .await
        })
    };
    let b = {
        let services = services.clone();
        tokio::spawn(async move {
            services
                .friends
                .request_friendship(bob.user_id, "alice")
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    let err = results.into_iter().find_map(|r| r.err()).unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn reconnect_keeps_latest_session() {
    let (services, _) = services();
    let alice = services.accounts.register("alice", "password-a").await.unwrap();

    let (first, _rx1) = ConnectionHandle::new();
    let (second, _rx2) = ConnectionHandle::new();
    services.registry.register(alice.user_id, first.clone()).await;
    services.registry.register(alice.user_id, second.clone()).await;

    assert!(!services.registry.deregister(alice.user_id, &first).await);
    assert_eq!(services.presence.user_offline(alice.user_id).await, 0);
    let live = services.registry.lookup(alice.user_id).await.unwrap();
    assert_eq!(live.conn_id(), second.conn_id());

    assert!(services.registry.deregister(alice.user_id, &second).await);
    assert!(!services.registry.is_online(alice.user_id).await);
}
