use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_core::credentials::CredentialService;
use courier_core::registry::ConnectionHandle;
use courier_core::{ChatError, ChatServices};
use courier_types::api::{Claims, ErrorKind};
use courier_types::events::{GatewayCommand, GatewayEvent};
use courier_types::models::{Friendship, Message as ChatMessage};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify handshake, registration,
/// then the event loop until either side goes away.
pub async fn handle_connection(socket: WebSocket, services: ChatServices) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with a session token
    let claims = match wait_for_identify(&mut receiver, services.credentials.as_ref()).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let user_id = claims.sub;
    let username = claims.username;

    info!("{} ({}) connected to gateway", username, user_id);

    run_connection_loop(sender, receiver, services, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    services: ChatServices,
    user_id: Uuid,
    username: String,
) {
    // Registered before Ready, so a client that saw Ready is reachable
    let (handle, mut user_rx) = ConnectionHandle::new();
    if let Some(previous) = services.registry.register(user_id, handle.clone()).await {
        info!(
            "{} ({}) replaced session {} with {}",
            username,
            user_id,
            previous.conn_id(),
            handle.conn_id()
        );
    }

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        disconnect(&services, user_id, &handle).await;
        return;
    }

    // Friends already here, queued ahead of anything the broadcast triggers
    match services.presence.online_friends(user_id).await {
        Ok(friends) => {
            for friend_id in friends {
                handle.send(GatewayEvent::FriendOnline { user_id: friend_id });
            }
        }
        Err(e) => warn!("online friends snapshot for {} failed: {}", user_id, e),
    }

    // Finished before the loop starts, so this connection's own disconnect
    // always runs after it.
    services.presence.user_online(user_id).await;

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_services = services.clone();
    let recv_handle = handle.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_services, &recv_handle, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        recv_handle.send(GatewayEvent::Error {
                            kind: ErrorKind::ValidationError,
                            message: format!("malformed command: {}", e),
                            request_id: None,
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    disconnect(&services, user_id, &handle).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

/// Only the connection that still owns the registry entry triggers the
/// offline broadcast; a stale one leaves a newer session alone.
async fn disconnect(services: &ChatServices, user_id: Uuid, handle: &ConnectionHandle) {
    if !services.registry.deregister(user_id, handle).await {
        debug!("{} already has a newer session", user_id);
        return;
    }
    let presence = services.presence.clone();
    tokio::spawn(async move {
        presence.user_offline(user_id).await;
    });
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    credentials: &dyn CredentialService,
) -> Option<Claims> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(GatewayCommand::Identify { token }) => {
                        return credentials.verify_token(&token);
                    }
                    _ => debug!("ignoring frame before Identify"),
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    services: &ChatServices,
    handle: &ConnectionHandle,
    user_id: Uuid,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Ping => {
            handle.send(GatewayEvent::Pong);
        }

        GatewayCommand::SendMessage {
            receiver_id,
            content,
            request_id,
        } => match services.delivery.send(user_id, receiver_id, &content).await {
            Ok(message) => {
                handle.send(GatewayEvent::MessageSent {
                    message,
                    request_id,
                });
            }
            Err(e) => report(handle, user_id, e, request_id),
        },

        GatewayCommand::MarkRead {
            message_id,
            request_id,
        } => {
            let result = services.delivery.mark_read(message_id, user_id).await;
            reply_message(handle, user_id, result, request_id);
        }

        GatewayCommand::MarkDelivered {
            message_id,
            request_id,
        } => {
            let result = services.delivery.mark_delivered(message_id, user_id).await;
            reply_message(handle, user_id, result, request_id);
        }

        GatewayCommand::RequestFriendship {
            username,
            request_id,
        } => {
            let result = services.friends.request_friendship(user_id, &username).await;
            reply_friendship(handle, user_id, result, request_id);
        }

        GatewayCommand::RespondFriendRequest {
            friendship_id,
            decision,
            request_id,
        } => {
            let result = services
                .friends
                .respond(friendship_id, user_id, decision)
                .await;
            reply_friendship(handle, user_id, result, request_id);
        }
    }
}

fn reply_message(
    handle: &ConnectionHandle,
    user_id: Uuid,
    result: courier_core::Result<ChatMessage>,
    request_id: Option<String>,
) {
    match result {
        Ok(message) => {
            handle.send(GatewayEvent::MessageUpdated {
                message,
                request_id,
            });
        }
        Err(e) => report(handle, user_id, e, request_id),
    }
}

fn reply_friendship(
    handle: &ConnectionHandle,
    user_id: Uuid,
    result: courier_core::Result<Friendship>,
    request_id: Option<String>,
) {
    match result {
        Ok(friendship) => {
            handle.send(GatewayEvent::FriendshipUpdated {
                friendship,
                request_id,
            });
        }
        Err(e) => report(handle, user_id, e, request_id),
    }
}

fn report(handle: &ConnectionHandle, user_id: Uuid, err: ChatError, request_id: Option<String>) {
    match &err {
        ChatError::Internal(e) => warn!("command from {} failed: {:#}", user_id, e),
        other => debug!("command from {} rejected: {}", user_id, other),
    }
    handle.send(GatewayEvent::Error {
        kind: err.kind(),
        message: err.public_message(),
        request_id,
    });
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
