//! Registry of managed display connections

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use signstream_types::{ConnectionMetrics, ConnectionState};

use crate::config::ConnectionConfig;
use crate::manager::ConnectionManager;
use crate::protocol::WireMessage;

/// Keyed collection of connection managers.
///
/// The map lock is held only for registry operations; the managers own
/// their sockets independently, so a stalled display never holds up
/// broadcast to the rest.
#[derive(Default)]
pub struct ConnectionPool {
    defaults: ConnectionConfig,
    connections: Mutex<HashMap<String, Arc<ConnectionManager>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool whose members share `defaults` unless overridden per call.
    pub fn with_defaults(defaults: ConnectionConfig) -> Self {
        Self {
            defaults,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection to `url` using the pool defaults.
    pub fn create_for_url(
        &self,
        id: impl Into<String>,
        url: impl Into<String>,
    ) -> Arc<ConnectionManager> {
        let config = ConnectionConfig {
            url: url.into(),
            ..self.defaults.clone()
        };
        self.create(id, config)
    }

    /// Register a connection under `id` with a fully specified config,
    /// replacing (and destroying) any previous connection with the same id.
    pub fn create(&self, id: impl Into<String>, config: ConnectionConfig) -> Arc<ConnectionManager> {
        let id = id.into();
        let manager = Arc::new(ConnectionManager::new(config));
        let previous = self
            .connections
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::clone(&manager));
        if let Some(previous) = previous {
            warn!(id = %id, "replacing existing connection");
            previous.destroy();
        }
        manager
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConnectionManager>> {
        self.connections.lock().unwrap().get(id).cloned()
    }

    /// Destroy and forget the connection under `id`.
    pub fn remove(&self, id: &str) -> bool {
        match self.connections.lock().unwrap().remove(id) {
            Some(manager) => {
                manager.destroy();
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.connections.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().unwrap().is_empty()
    }

    /// Send to every currently connected display; others are skipped, not
    /// buffered. Returns how many accepted the message.
    pub fn broadcast(&self, message: &WireMessage) -> usize {
        let managers: Vec<(String, Arc<ConnectionManager>)> = self
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|(id, m)| (id.clone(), Arc::clone(m)))
            .collect();

        let mut delivered = 0;
        for (id, manager) in managers {
            if manager.state() != ConnectionState::Connected {
                debug!(id = %id, state = %manager.state(), "skipping in broadcast");
                continue;
            }
            match manager.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(id = %id, "broadcast send failed: {}", e),
            }
        }
        delivered
    }

    /// Metrics for every registered connection.
    pub fn metrics(&self) -> HashMap<String, ConnectionMetrics> {
        let managers: Vec<(String, Arc<ConnectionManager>)> = self
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|(id, m)| (id.clone(), Arc::clone(m)))
            .collect();
        managers
            .into_iter()
            .map(|(id, m)| (id, m.metrics()))
            .collect()
    }

    /// Destroy every connection and empty the registry.
    pub fn destroy_all(&self) {
        let managers: Vec<Arc<ConnectionManager>> =
            self.connections.lock().unwrap().drain().map(|(_, m)| m).collect();
        for manager in managers {
            manager.destroy();
        }
    }
}
