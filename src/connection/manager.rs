use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AuthFailureHandler, Connector, ServerConnection, WorkOfflineOnAuthFailure};
use crate::cache::{CacheStore, ClientCacheManager};
use crate::client::{ClientConfig, ClientServerId};
use crate::error::P4Result;
use crate::preferences::UserPreferences;

/// Where connections keep their caches.
#[derive(Debug, Clone)]
enum CacheLocation {
    /// Under each project's storage directory
    Project,
    Fixed(CacheStore),
    /// Not persisted
    Memory,
}

/// Hands out one shared [`ServerConnection`] per client workspace.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    auth_handler: Arc<dyn AuthFailureHandler>,
    preferences: UserPreferences,
    location: CacheLocation,
    connections: Mutex<BTreeMap<ClientServerId, Arc<ServerConnection>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, preferences: UserPreferences) -> Self {
        ConnectionManager {
            connector,
            auth_handler: Arc::new(WorkOfflineOnAuthFailure),
            preferences,
            location: CacheLocation::Project,
            connections: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_auth_handler(mut self, handler: Arc<dyn AuthFailureHandler>) -> Self {
        self.auth_handler = handler;
        self
    }

    /// Keep every cache in `store` instead of the project directories.
    pub fn with_cache_store(mut self, store: CacheStore) -> Self {
        self.location = CacheLocation::Fixed(store);
        self
    }

    /// Keep caches in memory only.
    pub fn without_persistence(mut self) -> Self {
        self.location = CacheLocation::Memory;
        self
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.preferences
    }

    /// The connection for `config`, created on first use.
    ///
    /// Configs naming the same server identity and client share one
    /// connection, and with it one cache.
    pub fn connection_for(&self, config: &Arc<ClientConfig>) -> P4Result<Arc<ServerConnection>> {
        let id = config.client_server_id();
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(&id) {
            return Ok(existing.clone());
        }

        let exec = self.connector.connect(config)?;
        let store = match &self.location {
            CacheLocation::Project => Some(CacheStore::for_project(config.project_root())),
            CacheLocation::Fixed(store) => Some(store.clone()),
            CacheLocation::Memory => None,
        };
        let cache = match &store {
            Some(store) => store.open(&id),
            None => ClientCacheManager::new(id.clone()),
        };
        let online = !self.preferences.auto_offline;
        let mut connection = ServerConnection::new(config.clone(), exec, cache, online)
            .with_auth_handler(self.auth_handler.clone(), self.preferences.max_auth_retries);
        if let Some(store) = store {
            connection = connection.with_store(store);
        }
        log::info!(
            "Opened connection for {} ({})",
            id,
            if online { "online" } else { "offline" }
        );

        let connection = Arc::new(connection);
        connections.insert(id, connection.clone());
        Ok(connection)
    }

    pub fn connection(&self, id: &ClientServerId) -> Option<Arc<ServerConnection>> {
        self.connections.lock().get(id).cloned()
    }

    pub fn connections(&self) -> Vec<Arc<ServerConnection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Forget a connection; holders of its `Arc` keep a working handle.
    pub fn dispose(&self, id: &ClientServerId) -> Option<Arc<ServerConnection>> {
        let removed = self.connections.lock().remove(id);
        if let Some(connection) = &removed {
            connection.work_offline();
        }
        removed
    }
}
