//! Connection management for WebSocket clients.
//!
//! Tracks connected clients and their outbound channels. Exactly one delta
//! subscription exists per WebSocket; a player with two sockets is two
//! entries here and receives each delta twice (the client dedupes by
//! `snapshot_version`).

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Information about a connected client.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique ID for this connection
    pub connection_id: Uuid,
    /// Verified user identity
    pub user_id: String,
    /// The experience this connection joined
    pub experience: String,
}

/// Manages all active WebSocket connections.
///
/// Outbound channels carry pre-serialized JSON text: deltas arrive from the
/// bus already encoded and are forwarded as-is.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, (ConnectionInfo, mpsc::Sender<String>)>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    pub async fn register(
        &self,
        connection_id: Uuid,
        user_id: String,
        experience: String,
        sender: mpsc::Sender<String>,
    ) {
        let info = ConnectionInfo {
            connection_id,
            user_id,
            experience,
        };
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, (info, sender));
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Unregister a connection, dropping its sender.
    pub async fn unregister(&self, connection_id: Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(&connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    /// Get connection info by ID.
    pub async fn get(&self, connection_id: Uuid) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .map(|(info, _)| info.clone())
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let manager = ConnectionManager::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);

        manager
            .register(id, "alice".into(), "wylding-woods".into(), tx)
            .await;
        assert_eq!(manager.count().await, 1);
        let info = manager.get(id).await.expect("registered");
        assert_eq!(info.user_id, "alice");
        assert_eq!(info.experience, "wylding-woods");

        manager.unregister(id).await;
        assert_eq!(manager.count().await, 0);
        assert!(manager.get(id).await.is_none());
    }

    #[tokio::test]
    async fn same_user_may_hold_two_connections() {
        let manager = ConnectionManager::new();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, _rx_b) = mpsc::channel(8);
        manager
            .register(Uuid::new_v4(), "alice".into(), "wylding-woods".into(), tx_a)
            .await;
        manager
            .register(Uuid::new_v4(), "alice".into(), "wylding-woods".into(), tx_b)
            .await;
        assert_eq!(manager.count().await, 2);
    }
}
