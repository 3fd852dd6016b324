//! Friendship graph: requests, responses and the `are_friends` check that
//! gates every send.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use courier_types::api::FriendDecision;
use courier_types::events::GatewayEvent;
use courier_types::models::{FriendEntry, Friendship, FriendshipStatus, PendingRequest};

use crate::error::{ChatError, Result};
use crate::registry::SessionRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct FriendshipGraph {
    store: Arc<dyn Store>,
    registry: SessionRegistry,
}

impl FriendshipGraph {
    pub fn new(store: Arc<dyn Store>, registry: SessionRegistry) -> Self {
        Self { store, registry }
    }

    /// True iff an accepted record exists for the unordered pair.
    pub async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        Ok(self
            .store
            .friendship_between(a, b)
            .await?
            .is_some_and(|f| f.status == FriendshipStatus::Accepted))
    }

    pub async fn request_friendship(
        &self,
        requester_id: Uuid,
        addressee_username: &str,
    ) -> Result<Friendship> {
        let addressee_username = addressee_username.trim();
        if addressee_username.is_empty() {
            return Err(ChatError::Validation("username must not be empty".into()));
        }

        let addressee = self
            .store
            .user_by_username(addressee_username)
            .await?
            .ok_or(ChatError::NotFound("user"))?
            .user;
        if addressee.id == requester_id {
            return Err(ChatError::SelfReference);
        }

        let now = Utc::now();
        let friendship = Friendship {
            id: Uuid::new_v4(),
            requester_id,
            addressee_id: addressee.id,
            status: FriendshipStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        if !self.store.insert_friendship_if_absent(&friendship).await? {
            return Err(ChatError::AlreadyExists);
        }
        info!(
            "friend request {} from {} to {}",
            friendship.id, requester_id, addressee.id
        );

        if let Some(requester) = self.store.user_by_id(requester_id).await? {
            self.registry
                .send_to_user(
                    addressee.id,
                    GatewayEvent::FriendRequest {
                        request_id: friendship.id,
                        requester_id,
                        requester_username: requester.user.username,
                    },
                )
                .await;
        }

        Ok(friendship)
    }

    /// Only the addressee may answer, and only once.
    pub async fn respond(
        &self,
        request_id: Uuid,
        responder_id: Uuid,
        decision: FriendDecision,
    ) -> Result<Friendship> {
        let mut friendship = self
            .store
            .friendship_by_id(request_id)
            .await?
            .ok_or(ChatError::NotFound("friend request"))?;
        if friendship.addressee_id != responder_id {
            return Err(ChatError::Forbidden("respond to this friend request"));
        }
        if friendship.status != FriendshipStatus::Pending {
            return Err(ChatError::AlreadyResolved);
        }

        let status = match decision {
            FriendDecision::Accept => FriendshipStatus::Accepted,
            FriendDecision::Reject => FriendshipStatus::Rejected,
        };
        let now = Utc::now();
        if !self.store.resolve_friendship(request_id, status, now).await? {
            return Err(ChatError::AlreadyResolved);
        }
        friendship.status = status;
        friendship.updated_at = now;
        info!("friend request {} {} by {}", request_id, status, responder_id);

        self.registry
            .send_to_user(
                friendship.requester_id,
                GatewayEvent::FriendRequestResolved {
                    request_id,
                    user_id: responder_id,
                    status,
                },
            )
            .await;

        Ok(friendship)
    }

    /// Accepted friends with live presence taken from the registry.
    pub async fn list_friends(&self, user_id: Uuid) -> Result<Vec<FriendEntry>> {
        let rows = self.store.accepted_friendships(user_id).await?;
        let mut friends = Vec::with_capacity(rows.len());
        for (friendship, mut user) in rows {
            user.online = self.registry.is_online(user.id).await;
            friends.push(FriendEntry {
                friendship_id: friendship.id,
                user,
                since: friendship.updated_at,
            });
        }
        friends.sort_by(|a, b| a.user.username.cmp(&b.user.username));
        Ok(friends)
    }

    pub async fn list_pending(&self, user_id: Uuid) -> Result<Vec<PendingRequest>> {
        Ok(self.store.pending_requests_for(user_id).await?)
    }
}
