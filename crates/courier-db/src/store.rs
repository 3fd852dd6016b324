//! `courier_core::store` implementation over [`Database`]. Every call runs
//! on the blocking pool so SQLite never stalls the async runtime.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use courier_core::store::{FriendshipStore, MessageStore, UserRecord, UserStore};
use courier_types::models::{Friendship, FriendshipStatus, Message, PendingRequest, User};

use crate::Database;

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("database task failed: {}", e)
            })?
    }
}

fn into_record((user, password_hash): (User, String)) -> UserRecord {
    UserRecord {
        user,
        password_hash,
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn insert_user(&self, record: &UserRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |db| db.create_user(&record.user, &record.password_hash))
            .await
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.run(move |db| Ok(db.get_user_by_id(id)?.map(into_record)))
            .await
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let username = username.to_string();
        self.run(move |db| Ok(db.get_user_by_username(&username)?.map(into_record)))
            .await
    }

    async fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>> {
        let query = query.to_string();
        self.run(move |db| db.search_users(&query, exclude, limit))
            .await
    }

    async fn set_presence(&self, id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        self.run(move |db| db.set_presence(id, online, at)).await
    }
}

#[async_trait]
impl FriendshipStore for SqliteStore {
    async fn insert_friendship_if_absent(&self, friendship: &Friendship) -> Result<bool> {
        let friendship = friendship.clone();
        self.run(move |db| db.insert_friendship_if_absent(&friendship))
            .await
    }

    async fn friendship_by_id(&self, id: Uuid) -> Result<Option<Friendship>> {
        self.run(move |db| db.get_friendship(id)).await
    }

    async fn friendship_between(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
        self.run(move |db| db.get_friendship_between(a, b)).await
    }

    async fn resolve_friendship(
        &self,
        id: Uuid,
        status: FriendshipStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.run(move |db| db.resolve_friendship(id, status, at))
            .await
    }

    async fn accepted_friendships(&self, user_id: Uuid) -> Result<Vec<(Friendship, User)>> {
        self.run(move |db| db.get_accepted_friendships(user_id))
            .await
    }

    async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.run(move |db| db.get_friend_ids(user_id)).await
    }

    async fn pending_requests_for(&self, addressee_id: Uuid) -> Result<Vec<PendingRequest>> {
        self.run(move |db| db.get_pending_requests(addressee_id))
            .await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &Message) -> Result<()> {
        let message = message.clone();
        self.run(move |db| db.insert_message(&message)).await
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        self.run(move |db| db.get_message(id)).await
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.run(move |db| db.mark_delivered(id, at)).await
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.run(move |db| db.mark_read(id, at)).await
    }

    async fn conversation(
        &self,
        a: Uuid,
        b: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.run(move |db| db.get_conversation(a, b, limit, offset))
            .await
    }
}
