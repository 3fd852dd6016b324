//! Presence and message-delivery core.
//!
//! Everything here runs against the [`store::Store`] traits and a single
//! in-process [`registry::SessionRegistry`]; the REST and WebSocket crates
//! are thin transports over [`ChatServices`].

pub mod accounts;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod friends;
pub mod memory;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use accounts::Accounts;
use credentials::CredentialService;
use delivery::DeliveryEngine;
use friends::FriendshipGraph;
use notify::OfflineNotifier;
use presence::PresenceBroadcaster;
use registry::SessionRegistry;
use store::Store;

pub use error::{ChatError, Result};

/// One instance per process; cloning shares the same registry and store.
#[derive(Clone)]
pub struct ChatServices {
    pub accounts: Accounts,
    pub friends: FriendshipGraph,
    pub delivery: DeliveryEngine,
    pub presence: PresenceBroadcaster,
    pub registry: SessionRegistry,
    pub credentials: Arc<dyn CredentialService>,
}

impl ChatServices {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialService>,
        notifier: Arc<dyn OfflineNotifier>,
    ) -> Self {
        let registry = SessionRegistry::new();
        Self {
            accounts: Accounts::new(store.clone(), credentials.clone()),
            friends: FriendshipGraph::new(store.clone(), registry.clone()),
            delivery: DeliveryEngine::new(store.clone(), registry.clone(), notifier),
            presence: PresenceBroadcaster::new(store, registry.clone()),
            registry,
            credentials,
        }
    }
}
