//! End-to-end gateway tests over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use uuid::Uuid;

use courier_core::ChatServices;
use courier_core::credentials::JwtCredentials;
use courier_core::memory::MemoryStore;
use courier_core::notify::NoopNotifier;
use courier_types::api::{AuthResponse, ErrorKind, FriendDecision};
use courier_types::events::{GatewayCommand, GatewayEvent};
use courier_types::models::{FriendshipStatus, MessageStatus};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, ChatServices) {
    let services = ChatServices::new(
        Arc::new(MemoryStore::new()),
        Arc::new(JwtCredentials::new("gateway-secret", chrono::Duration::hours(1))),
        Arc::new(NoopNotifier),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = courier_gateway::router(services.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, services)
}

async fn friends(services: &ChatServices) -> (AuthResponse, AuthResponse) {
    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let bob = services.accounts.register("bob", "password-b").await.unwrap();
    let request = services
        .friends
        .request_friendship(alice.user_id, "bob")
        .await
        .unwrap();
    services
        .friends
        .respond(request.id, bob.user_id, FriendDecision::Accept)
        .await
        .unwrap();
    (alice, bob)
}

async fn send(ws: &mut Client, cmd: GatewayCommand) {
    let text = serde_json::to_string(&cmd).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn recv(ws: &mut Client) -> GatewayEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skips unrelated events until one matches.
async fn recv_until(ws: &mut Client, wanted: impl Fn(&GatewayEvent) -> bool) -> GatewayEvent {
    loop {
        let event = recv(ws).await;
        if wanted(&event) {
            return event;
        }
    }
}

async fn identify(addr: SocketAddr, auth: &AuthResponse) -> Client {
    let (mut ws, _) = connect_async(format!("ws://{addr}/gateway")).await.unwrap();
    send(
        &mut ws,
        GatewayCommand::Identify {
            token: auth.token.clone(),
        },
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        GatewayEvent::Ready {
            user_id: auth.user_id,
            username: auth.username.clone(),
        }
    );
    ws
}

#[tokio::test]
async fn invalid_token_closes_the_socket() {
    let (addr, _) = start().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/gateway")).await.unwrap();
    send(
        &mut ws,
        GatewayCommand::Identify {
            token: "garbage".into(),
        },
    )
    .await;

    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server kept the socket open");
    match next {
        None | Some(Ok(Message::Close(_))) | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("unexpected frame {other:?}"),
    }
}

#[tokio::test]
async fn presence_and_live_delivery() {
    let (addr, services) = start().await;
    let (alice, bob) = friends(&services).await;

    let mut alice_ws = identify(addr, &alice).await;
    let mut bob_ws = identify(addr, &bob).await;

    // bob gets a snapshot of alice, alice gets the broadcast for bob
    assert_eq!(
        recv(&mut bob_ws).await,
        GatewayEvent::FriendOnline {
            user_id: alice.user_id
        }
    );
    assert_eq!(
        recv(&mut alice_ws).await,
        GatewayEvent::FriendOnline {
            user_id: bob.user_id
        }
    );

    send(
        &mut bob_ws,
        GatewayCommand::SendMessage {
            receiver_id: alice.user_id,
            content: "hi alice".into(),
            request_id: Some("r1".into()),
        },
    )
    .await;

    let message = match recv_until(&mut alice_ws, |e| {
        matches!(e, GatewayEvent::ReceiveMessage { .. })
    })
    .await
    {
        GatewayEvent::ReceiveMessage { message } => message,
        other => panic!("expected ReceiveMessage, got {other:?}"),
    };
    assert_eq!(message.content, "hi alice");
    assert_eq!(message.status, MessageStatus::Delivered);

    let ack = recv_until(&mut bob_ws, |e| matches!(e, GatewayEvent::MessageSent { .. })).await;
    assert_eq!(
        ack,
        GatewayEvent::MessageSent {
            message: message.clone(),
            request_id: Some("r1".into()),
        }
    );

    send(
        &mut alice_ws,
        GatewayCommand::MarkRead {
            message_id: message.id,
            request_id: Some("r2".into()),
        },
    )
    .await;
    match recv_until(&mut alice_ws, |e| matches!(e, GatewayEvent::MessageUpdated { .. })).await {
        GatewayEvent::MessageUpdated {
            message: read,
            request_id,
        } => {
            assert_eq!(read.id, message.id);
            assert_eq!(read.status, MessageStatus::Read);
            assert!(read.read_at.is_some());
            assert_eq!(request_id.as_deref(), Some("r2"));
        }
        _ => unreachable!(),
    }
    let update = recv_until(&mut bob_ws, |e| {
        matches!(
            e,
            GatewayEvent::MessageStatusUpdate {
                status: MessageStatus::Read,
                ..
            }
        )
    })
    .await;
    assert_eq!(
        update,
        GatewayEvent::MessageStatusUpdate {
            message_id: message.id,
            status: MessageStatus::Read,
        }
    );

    alice_ws.close(None).await.unwrap();
    assert_eq!(
        recv_until(&mut bob_ws, |e| matches!(e, GatewayEvent::FriendOffline { .. })).await,
        GatewayEvent::FriendOffline {
            user_id: alice.user_id
        }
    );
    assert!(!services.registry.is_online(alice.user_id).await);
}

#[tokio::test]
async fn command_errors_are_reported_to_the_caller() {
    let (addr, services) = start().await;
    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let stranger = services.accounts.register("stranger", "password-s").await.unwrap();
    let mut ws = identify(addr, &alice).await;

    send(&mut ws, GatewayCommand::Ping).await;
    assert_eq!(recv(&mut ws).await, GatewayEvent::Pong);

    send(
        &mut ws,
        GatewayCommand::SendMessage {
            receiver_id: stranger.user_id,
            content: "hello".into(),
            request_id: Some("r9".into()),
        },
    )
    .await;
    match recv(&mut ws).await {
        GatewayEvent::Error {
            kind, request_id, ..
        } => {
            assert_eq!(kind, ErrorKind::NotFriends);
            assert_eq!(request_id.as_deref(), Some("r9"));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    send(
        &mut ws,
        GatewayCommand::MarkRead {
            message_id: Uuid::new_v4(),
            request_id: Some("r10".into()),
        },
    )
    .await;
    match recv(&mut ws).await {
        GatewayEvent::Error {
            kind, request_id, ..
        } => {
            assert_eq!(kind, ErrorKind::NotFound);
            assert_eq!(request_id.as_deref(), Some("r10"));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    send(
        &mut ws,
        GatewayCommand::RequestFriendship {
            username: "alice".into(),
            request_id: Some("r11".into()),
        },
    )
    .await;
    match recv(&mut ws).await {
        GatewayEvent::Error {
            kind, request_id, ..
        } => {
            assert_eq!(kind, ErrorKind::ValidationError);
            assert_eq!(request_id.as_deref(), Some("r11"));
        }
        other => panic!("expected Error, got {other:?}"),
    }

    ws.send(Message::Text("{\"type\":\"Nope\"}".into())).await.unwrap();
    match recv(&mut ws).await {
        GatewayEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::ValidationError),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn friend_requests_arrive_live() {
    let (addr, services) = start().await;
    let alice = services.accounts.register("alice", "password-a").await.unwrap();
    let bob = services.accounts.register("bob", "password-b").await.unwrap();
    let mut alice_ws = identify(addr, &alice).await;
    let mut bob_ws = identify(addr, &bob).await;

    send(
        &mut alice_ws,
        GatewayCommand::RequestFriendship {
            username: "bob".into(),
            request_id: Some("f1".into()),
        },
    )
    .await;
    let pending = match recv_until(&mut alice_ws, |e| {
        matches!(e, GatewayEvent::FriendshipUpdated { .. })
    })
    .await
    {
        GatewayEvent::FriendshipUpdated {
            friendship,
            request_id,
        } => {
            assert_eq!(friendship.status, FriendshipStatus::Pending);
            assert_eq!(friendship.addressee_id, bob.user_id);
            assert_eq!(request_id.as_deref(), Some("f1"));
            friendship
        }
        _ => unreachable!(),
    };
    let request_id = match recv(&mut bob_ws).await {
        GatewayEvent::FriendRequest {
            request_id,
            requester_id,
            requester_username,
        } => {
            assert_eq!(requester_id, alice.user_id);
            assert_eq!(requester_username, "alice");
            request_id
        }
        other => panic!("expected FriendRequest, got {other:?}"),
    };

    send(
        &mut bob_ws,
        GatewayCommand::RespondFriendRequest {
            friendship_id: request_id,
            decision: FriendDecision::Accept,
            request_id: Some("f2".into()),
        },
    )
    .await;
    match recv_until(&mut bob_ws, |e| matches!(e, GatewayEvent::FriendshipUpdated { .. })).await {
        GatewayEvent::FriendshipUpdated {
            friendship,
            request_id: ack,
        } => {
            assert_eq!(friendship.id, pending.id);
            assert_eq!(friendship.status, FriendshipStatus::Accepted);
            assert_eq!(ack.as_deref(), Some("f2"));
        }
        _ => unreachable!(),
    }
    match recv_until(&mut alice_ws, |e| {
        matches!(e, GatewayEvent::FriendRequestResolved { .. })
    })
    .await
    {
        GatewayEvent::FriendRequestResolved {
            request_id: resolved,
            user_id,
            ..
        } => {
            assert_eq!(resolved, request_id);
            assert_eq!(user_id, bob.user_id);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn reconnect_does_not_broadcast_offline() {
    let (addr, services) = start().await;
    let (alice, bob) = friends(&services).await;
    let mut bob_ws = identify(addr, &bob).await;

    let first = identify(addr, &alice).await;
    assert_eq!(
        recv(&mut bob_ws).await,
        GatewayEvent::FriendOnline {
            user_id: alice.user_id
        }
    );
    let _second = identify(addr, &alice).await;
    assert_eq!(
        recv(&mut bob_ws).await,
        GatewayEvent::FriendOnline {
            user_id: alice.user_id
        }
    );

    drop(first);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(services.registry.is_online(alice.user_id).await);

    send(&mut bob_ws, GatewayCommand::Ping).await;
    assert_eq!(recv(&mut bob_ws).await, GatewayEvent::Pong);
}
