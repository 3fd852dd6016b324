use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ErrorKind, FriendDecision};
use crate::models::{Friendship, FriendshipStatus, Message, MessageStatus};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A message addressed to this user, pushed in real time
    ReceiveMessage { message: Message },

    /// A message this user sent changed status
    MessageStatusUpdate {
        message_id: Uuid,
        status: MessageStatus,
    },

    /// Acknowledges a `SendMessage` command
    MessageSent {
        message: Message,
        request_id: Option<String>,
    },

    /// Acknowledges `MarkRead` / `MarkDelivered` with the stored message
    MessageUpdated {
        message: Message,
        request_id: Option<String>,
    },

    /// Acknowledges `RequestFriendship` / `RespondFriendRequest`
    FriendshipUpdated {
        friendship: Friendship,
        request_id: Option<String>,
    },

    FriendOnline { user_id: Uuid },

    FriendOffline { user_id: Uuid },

    /// Someone asked to be this user's friend
    FriendRequest {
        request_id: Uuid,
        requester_id: Uuid,
        requester_username: String,
    },

    /// The addressee answered a request this user made
    FriendRequestResolved {
        request_id: Uuid,
        user_id: Uuid,
        status: FriendshipStatus,
    },

    /// A command from this connection failed
    Error {
        kind: ErrorKind,
        message: String,
        request_id: Option<String>,
    },

    Pong,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    SendMessage {
        receiver_id: Uuid,
        content: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    MarkRead {
        message_id: Uuid,
        #[serde(default)]
        request_id: Option<String>,
    },

    MarkDelivered {
        message_id: Uuid,
        #[serde(default)]
        request_id: Option<String>,
    },

    RequestFriendship {
        username: String,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// `friendship_id` is the id carried by `FriendRequest`
    RespondFriendRequest {
        friendship_id: Uuid,
        decision: FriendDecision,
        #[serde(default)]
        request_id: Option<String>,
    },

    Ping,
}
