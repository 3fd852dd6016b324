//! In-memory `Store` with the same semantics as the SQLite store.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use courier_types::models::{
    Friendship, FriendshipStatus, Message, MessageStatus, PendingRequest, User,
};

use crate::store::{FriendshipStore, MessageStore, UserRecord, UserStore};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    friendships: Vec<Friendship>,
    /// Insertion order doubles as the tie-breaker for equal timestamps.
    messages: Vec<Message>,
}

impl Tables {
    fn user(&self, id: Uuid) -> Result<User> {
        self.users
            .get(&id)
            .map(|r| r.user.clone())
            .ok_or_else(|| anyhow!("dangling user reference {}", id))
    }

    fn active_between(&self, a: Uuid, b: Uuid) -> Option<&Friendship> {
        self.friendships
            .iter()
            .find(|f| {
                f.status.is_active()
                    && ((f.requester_id == a && f.addressee_id == b)
                        || (f.requester_id == b && f.addressee_id == a))
            })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, record: &UserRecord) -> Result<()> {
        let mut tables = self.inner.lock().await;
        if tables
            .users
            .values()
            .any(|r| r.user.username == record.user.username)
        {
            return Err(anyhow!("UNIQUE constraint failed: users.username"));
        }
        tables.users.insert(record.user.id, record.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|r| r.user.username == username)
            .cloned())
    }

    async fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>> {
        let needle = query.to_lowercase();
        let tables = self.inner.lock().await;
        let mut found: Vec<User> = tables
            .users
            .values()
            .filter(|r| r.user.id != exclude && r.user.username.to_lowercase().contains(&needle))
            .map(|r| r.user.clone())
            .collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn set_presence(&self, id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.inner.lock().await;
        if let Some(record) = tables.users.get_mut(&id) {
            record.user.online = online;
            record.user.last_seen = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl FriendshipStore for MemoryStore {
    async fn insert_friendship_if_absent(&self, friendship: &Friendship) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        if tables
            .active_between(friendship.requester_id, friendship.addressee_id)
            .is_some()
        {
            return Ok(false);
        }
        tables.friendships.push(friendship.clone());
        Ok(true)
    }

    async fn friendship_by_id(&self, id: Uuid) -> Result<Option<Friendship>> {
        Ok(self
            .inner
            .lock()
            .await
            .friendships
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn friendship_between(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
        Ok(self.inner.lock().await.active_between(a, b).cloned())
    }

    async fn resolve_friendship(
        &self,
        id: Uuid,
        status: FriendshipStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        match tables
            .friendships
            .iter_mut()
            .find(|f| f.id == id && f.status == FriendshipStatus::Pending)
        {
            Some(f) => {
                f.status = status;
                f.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn accepted_friendships(&self, user_id: Uuid) -> Result<Vec<(Friendship, User)>> {
        let tables = self.inner.lock().await;
        tables
            .friendships
            .iter()
            .filter(|f| f.status == FriendshipStatus::Accepted && f.involves(user_id))
            .map(|f| tables.user(f.other(user_id)).map(|user| (f.clone(), user)))
            .collect()
    }

    async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .inner
            .lock()
            .await
            .friendships
            .iter()
            .filter(|f| f.status == FriendshipStatus::Accepted && f.involves(user_id))
            .map(|f| f.other(user_id))
            .collect())
    }

    async fn pending_requests_for(&self, addressee_id: Uuid) -> Result<Vec<PendingRequest>> {
        let tables = self.inner.lock().await;
        tables
            .friendships
            .iter()
            .filter(|f| f.status == FriendshipStatus::Pending && f.addressee_id == addressee_id)
            .map(|f| {
                tables.user(f.requester_id).map(|requester| PendingRequest {
                    id: f.id,
                    requester,
                    created_at: f.created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: &Message) -> Result<()> {
        self.inner.lock().await.messages.push(message.clone());
        Ok(())
    }

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self
            .inner
            .lock()
            .await
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        match tables
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.status == MessageStatus::Sent)
        {
            Some(m) => {
                m.status = MessageStatus::Delivered;
                m.delivered_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.inner.lock().await;
        match tables
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.status != MessageStatus::Read)
        {
            Some(m) => {
                m.status = MessageStatus::Read;
                m.delivered_at.get_or_insert(at);
                m.read_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn conversation(
        &self,
        a: Uuid,
        b: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let tables = self.inner.lock().await;
        let mut thread: Vec<&Message> = tables
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        thread.sort_by_key(|m| m.created_at);
        Ok(thread
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
