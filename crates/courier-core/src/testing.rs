//! Shared fixtures for the unit tests in this crate.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use courier_types::api::FriendDecision;
use courier_types::models::User;

use crate::delivery::DeliveryEngine;
use crate::friends::FriendshipGraph;
use crate::memory::MemoryStore;
use crate::notify::{OfflineNotice, OfflineNotifier};
use crate::presence::PresenceBroadcaster;
use crate::registry::SessionRegistry;
use crate::store::{UserRecord, UserStore};

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<OfflineNotice>>,
    arrived: Notify,
}

impl RecordingNotifier {
    /// Waits for the next notice from the spawned hook task.
    pub async fn next(&self) -> OfflineNotice {
        loop {
            let arrived = self.arrived.notified();
            {
                let mut notices = self.notices.lock().await;
                if !notices.is_empty() {
                    return notices.remove(0);
                }
            }
            arrived.await;
        }
    }

    pub async fn is_empty(&self) -> bool {
        tokio::task::yield_now().await;
        self.notices.lock().await.is_empty()
    }
}

#[async_trait::async_trait]
impl OfflineNotifier for RecordingNotifier {
    async fn notify(&self, notice: OfflineNotice) -> anyhow::Result<()> {
        self.notices.lock().await.push(notice);
        self.arrived.notify_waiters();
        Ok(())
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub registry: SessionRegistry,
    pub friends: FriendshipGraph,
    pub delivery: DeliveryEngine,
    pub presence: PresenceBroadcaster,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new();
        let notifier = Arc::new(RecordingNotifier::default());
        Self {
            friends: FriendshipGraph::new(store.clone(), registry.clone()),
            delivery: DeliveryEngine::new(store.clone(), registry.clone(), notifier.clone()),
            presence: PresenceBroadcaster::new(store.clone(), registry.clone()),
            store,
            registry,
            notifier,
        }
    }
}

/// Inserts a user directly, skipping password hashing.
pub async fn add_user(store: &MemoryStore, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_user(&UserRecord {
            user: User {
                id,
                username: username.to_string(),
                online: false,
                last_seen: None,
                created_at: Utc::now(),
            },
            password_hash: String::new(),
        })
        .await
        .unwrap();
    id
}

pub async fn befriend(fx: &Fixture, a: Uuid, b: Uuid) {
    let b_name = fx.store.user_by_id(b).await.unwrap().unwrap().user.username;
    let request = fx.friends.request_friendship(a, &b_name).await.unwrap();
    fx.friends
        .respond(request.id, b, FriendDecision::Accept)
        .await
        .unwrap();
}
