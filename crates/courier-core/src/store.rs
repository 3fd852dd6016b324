//! Repository interfaces the core runs against.
//!
//! Implementations must make every status write a single conditional
//! statement: a transition that no longer applies reports `false` instead
//! of overwriting newer state.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_types::models::{
    Friendship, FriendshipStatus, Message, PendingRequest, User,
};

/// A user together with the credential hash. Only the store and the
/// account service see this type.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, record: &UserRecord) -> Result<()>;

    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>>;

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Case-insensitive substring match on username, excluding `exclude`.
    async fn search_users(&self, query: &str, exclude: Uuid, limit: u32) -> Result<Vec<User>>;

    async fn set_presence(&self, id: Uuid, online: bool, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait FriendshipStore: Send + Sync {
    /// Inserts `friendship` unless a pending or accepted record already
    /// exists for the same unordered pair. Returns whether it was inserted.
    async fn insert_friendship_if_absent(&self, friendship: &Friendship) -> Result<bool>;

    async fn friendship_by_id(&self, id: Uuid) -> Result<Option<Friendship>>;

    /// The pending or accepted record for the unordered pair, if any.
    async fn friendship_between(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>>;

    /// Moves a pending record to `status`. Returns `false` if it was no
    /// longer pending.
    async fn resolve_friendship(
        &self,
        id: Uuid,
        status: FriendshipStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Accepted relationships of `user_id`, one per friend.
    async fn accepted_friendships(&self, user_id: Uuid) -> Result<Vec<(Friendship, User)>>;

    async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    async fn pending_requests_for(&self, addressee_id: Uuid) -> Result<Vec<PendingRequest>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &Message) -> Result<()>;

    async fn message_by_id(&self, id: Uuid) -> Result<Option<Message>>;

    /// sent -> delivered. Returns `false` if the message had moved on.
    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// sent|delivered -> read, stamping `delivered_at` as well when it was
    /// never set. Returns `false` if the message was already read.
    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Messages between the pair in either direction, oldest first.
    async fn conversation(&self, a: Uuid, b: Uuid, limit: u32, offset: u32)
    -> Result<Vec<Message>>;
}

pub trait Store: UserStore + FriendshipStore + MessageStore {}

impl<T: UserStore + FriendshipStore + MessageStore> Store for T {}
