use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// Outbound side of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    /// A fresh handle plus the receiver its connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queues an event for the connection. Returns `false` once the
    /// connection task has gone away.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Maps each user to at most one live connection.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// user_id -> current connection
    sessions: RwLock<HashMap<Uuid, ConnectionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user_id` to `handle`, replacing any previous connection.
    /// The replaced handle is returned; closing it is up to the transport.
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let conn_id = handle.conn_id;
        let previous = self.inner.sessions.write().await.insert(user_id, handle);
        match &previous {
            Some(old) => debug!(
                "session for {} replaced ({} -> {})",
                user_id, old.conn_id, conn_id
            ),
            None => debug!("session for {} registered ({})", user_id, conn_id),
        }
        previous
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.inner.sessions.read().await.get(&user_id).cloned()
    }

    /// Removes the mapping, but only if it still points at `handle`.
    /// A stale connection closing after being replaced is a no-op.
    pub async fn deregister(&self, user_id: Uuid, handle: &ConnectionHandle) -> bool {
        let mut sessions = self.inner.sessions.write().await;
        let owned = sessions
            .get(&user_id)
            .is_some_and(|current| current.conn_id == handle.conn_id);
        if owned {
            sessions.remove(&user_id);
            debug!("session for {} deregistered ({})", user_id, handle.conn_id);
        } else {
            trace!(
                "ignoring stale deregister for {} ({})",
                user_id, handle.conn_id
            );
        }
        owned
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.sessions.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Send a targeted event to a specific user. The handle is copied out
    /// before sending so the lock is never held across the send.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        match self.lookup(user_id).await {
            Some(handle) => handle.send(event),
            None => false,
        }
    }
}
