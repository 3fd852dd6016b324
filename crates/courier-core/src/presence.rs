use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::store::Store;

/// Flips the online flag and tells connected friends. Failures are logged
/// and swallowed; presence never blocks a connection or a send.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    store: Arc<dyn Store>,
    registry: SessionRegistry,
}

impl PresenceBroadcaster {
    pub fn new(store: Arc<dyn Store>, registry: SessionRegistry) -> Self {
        Self { store, registry }
    }

    /// Returns how many friends were notified. Skipped entirely if the
    /// session is already gone, so a late call cannot undo `user_offline`.
    pub async fn user_online(&self, user_id: Uuid) -> usize {
        if !self.registry.is_online(user_id).await {
            debug!("{} has no session, skipping online broadcast", user_id);
            return 0;
        }
        if let Err(e) = self.store.set_presence(user_id, true, Utc::now()).await {
            warn!("failed to mark {} online: {}", user_id, e);
        }
        self.fan_out(user_id, GatewayEvent::FriendOnline { user_id })
            .await
    }

    /// Skipped entirely if the user reconnected before this ran.
    pub async fn user_offline(&self, user_id: Uuid) -> usize {
        if self.registry.is_online(user_id).await {
            debug!("{} reconnected, skipping offline broadcast", user_id);
            return 0;
        }
        if let Err(e) = self.store.set_presence(user_id, false, Utc::now()).await {
            warn!("failed to mark {} offline: {}", user_id, e);
        }
        self.fan_out(user_id, GatewayEvent::FriendOffline { user_id })
            .await
    }

    /// Friends of `user_id` that currently hold a session.
    pub async fn online_friends(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let mut online = Vec::new();
        for friend_id in self.store.friend_ids(user_id).await? {
            if self.registry.is_online(friend_id).await {
                online.push(friend_id);
            }
        }
        Ok(online)
    }

    async fn fan_out(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let friend_ids = match self.store.friend_ids(user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("presence fan-out for {} failed: {}", user_id, e);
                return 0;
            }
        };

        let mut notified = 0;
        for friend_id in friend_ids {
            if self.registry.send_to_user(friend_id, event.clone()).await {
                notified += 1;
            }
        }
        debug!("presence for {} sent to {} friends", user_id, notified);
        notified
    }
}
