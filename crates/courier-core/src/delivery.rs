//! Delivery engine: authorize, persist, push to a live session or fall
//! back to the offline hook, and drive the sent -> delivered -> read
//! state machine.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_types::events::GatewayEvent;
use courier_types::models::{Message, MessageStatus};

use crate::error::{ChatError, Result};
use crate::friends::FriendshipGraph;
use crate::notify::{OfflineNotice, OfflineNotifier};
use crate::registry::SessionRegistry;
use crate::store::Store;

pub const MAX_CONTENT_CHARS: usize = 4000;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<dyn Store>,
    registry: SessionRegistry,
    friends: FriendshipGraph,
    notifier: Arc<dyn OfflineNotifier>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: SessionRegistry,
        notifier: Arc<dyn OfflineNotifier>,
    ) -> Self {
        let friends = FriendshipGraph::new(store.clone(), registry.clone());
        Self {
            store,
            registry,
            friends,
            notifier,
        }
    }

    /// Nothing is persisted unless the pair are friends at call time.
    pub async fn send(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message content must not be empty".into()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ChatError::Validation(format!(
                "message content exceeds {} characters",
                MAX_CONTENT_CHARS
            )));
        }

        if !self.friends.are_friends(sender_id, receiver_id).await? {
            return Err(ChatError::NotFriends);
        }

        let mut message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            status: MessageStatus::Sent,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        self.store.insert_message(&message).await?;
        debug!("message {} persisted ({} -> {})", message.id, sender_id, receiver_id);

        // Pushed as delivered, but only recorded so once the push went out.
        // A session that closed in the meantime counts as offline.
        let pushed = match self.registry.lookup(receiver_id).await {
            Some(handle) => {
                let now = Utc::now();
                let live = Message {
                    status: MessageStatus::Delivered,
                    delivered_at: Some(now),
                    ..message.clone()
                };
                if handle.send(GatewayEvent::ReceiveMessage {
                    message: live.clone(),
                }) {
                    Some((live, now))
                } else {
                    debug!(
                        "connection for {} closed before delivery of {}",
                        receiver_id, message.id
                    );
                    None
                }
            }
            None => None,
        };

        match pushed {
            Some((live, now)) => {
                if self.store.mark_delivered(message.id, now).await? {
                    message = live;
                    self.registry
                        .send_to_user(
                            sender_id,
                            GatewayEvent::MessageStatusUpdate {
                                message_id: message.id,
                                status: MessageStatus::Delivered,
                            },
                        )
                        .await;
                } else if let Some(stored) = self.store.message_by_id(message.id).await? {
                    // The receiver already moved it on (read)
                    message = stored;
                }
            }
            None => self.notify_offline(&message),
        }

        Ok(message)
    }

    /// Idempotent: a message that is already read is returned unchanged and
    /// no second status event is emitted.
    pub async fn mark_read(&self, message_id: Uuid, reader_id: Uuid) -> Result<Message> {
        let message = self.receivable(message_id, reader_id).await?;
        if message.status == MessageStatus::Read {
            return Ok(message);
        }

        let transitioned = self.store.mark_read(message_id, Utc::now()).await?;
        let message = self
            .store
            .message_by_id(message_id)
            .await?
            .ok_or(ChatError::NotFound("message"))?;

        if transitioned {
            info!("message {} read by {}", message_id, reader_id);
            self.registry
                .send_to_user(
                    message.sender_id,
                    GatewayEvent::MessageStatusUpdate {
                        message_id,
                        status: MessageStatus::Read,
                    },
                )
                .await;
        }
        Ok(message)
    }

    /// Receiver acknowledges a message it picked up from history. A no-op
    /// for anything past `sent`.
    pub async fn mark_delivered(&self, message_id: Uuid, reader_id: Uuid) -> Result<Message> {
        let mut message = self.receivable(message_id, reader_id).await?;
        if message.status != MessageStatus::Sent {
            return Ok(message);
        }

        let now = Utc::now();
        if self.store.mark_delivered(message_id, now).await? {
            message.status = MessageStatus::Delivered;
            message.delivered_at = Some(now);
            self.registry
                .send_to_user(
                    message.sender_id,
                    GatewayEvent::MessageStatusUpdate {
                        message_id,
                        status: MessageStatus::Delivered,
                    },
                )
                .await;
            Ok(message)
        } else {
            // Raced with another transition; report what is stored.
            self.store
                .message_by_id(message_id)
                .await?
                .ok_or(ChatError::NotFound("message"))
        }
    }

    /// History never changes message status.
    pub async fn get_conversation(
        &self,
        user_id: Uuid,
        partner_id: Uuid,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Message>> {
        if self.store.user_by_id(partner_id).await?.is_none() {
            return Err(ChatError::NotFound("user"));
        }
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self
            .store
            .conversation(user_id, partner_id, limit, offset)
            .await?)
    }

    async fn receivable(&self, message_id: Uuid, reader_id: Uuid) -> Result<Message> {
        let message = self
            .store
            .message_by_id(message_id)
            .await?
            .ok_or(ChatError::NotFound("message"))?;
        if message.receiver_id != reader_id {
            return Err(ChatError::Forbidden("update the status of this message"));
        }
        Ok(message)
    }

    /// Fire-and-forget; the persisted message stands whatever happens here.
    fn notify_offline(&self, message: &Message) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let sender_id = message.sender_id;
        let receiver_id = message.receiver_id;
        let content = message.content.clone();

        tokio::spawn(async move {
            let sender_username = match store.user_by_id(sender_id).await {
                Ok(Some(record)) => record.user.username,
                Ok(None) => sender_id.to_string(),
                Err(e) => {
                    warn!("offline notice: sender lookup failed for {}: {}", sender_id, e);
                    sender_id.to_string()
                }
            };
            let notice = OfflineNotice::new(receiver_id, sender_username, &content);
            if let Err(e) = notifier.notify(notice).await {
                warn!("offline notice for {} failed: {}", receiver_id, e);
            }
        });
    }
}
