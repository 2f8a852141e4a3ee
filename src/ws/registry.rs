use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::models::{Identity, ServerMessage};

pub type ConnectionId = Uuid;

/// Queue feeding a socket's writer task with serialized frames
pub type Outbound = mpsc::UnboundedSender<String>;

#[derive(Debug)]
struct Connection {
    outbound: Outbound,
    user: Option<Identity>,
    rooms: HashSet<String>,
    opened_at: DateTime<Utc>,
}

/// What is left of a connection after it has been removed
#[derive(Debug)]
pub struct ClosedConnection {
    pub user: Option<Identity>,
    pub rooms: HashSet<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryStats {
    pub connections: usize,
    pub authenticated: usize,
}

/// Every live socket, its auth state and the rooms it joined.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_open(&self, outbound: Outbound) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let connection = Connection {
            outbound,
            user: None,
            rooms: HashSet::new(),
            opened_at: Utc::now(),
        };
        self.connections.write().await.insert(connection_id, connection);
        info!("Connection {} opened", connection_id);
        connection_id
    }

    /// Forget a connection. Returns `None` when it was already closed, so the
    /// caller only runs room cleanup once.
    pub async fn on_close(&self, connection_id: ConnectionId) -> Option<ClosedConnection> {
        let connection = self.connections.write().await.remove(&connection_id)?;
        let lifetime = Utc::now() - connection.opened_at;
        info!(
            "Connection {} closed after {}s ({} rooms)",
            connection_id,
            lifetime.num_seconds(),
            connection.rooms.len()
        );
        Some(ClosedConnection {
            user: connection.user,
            rooms: connection.rooms,
        })
    }

    pub async fn mark_authenticated(&self, connection_id: ConnectionId, user: Identity) -> bool {
        match self.connections.write().await.get_mut(&connection_id) {
            Some(connection) => {
                connection.user = Some(user);
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&connection_id)
    }

    pub async fn identity(&self, connection_id: ConnectionId) -> Option<Identity> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .and_then(|c| c.user.clone())
    }

    pub async fn outbound(&self, connection_id: ConnectionId) -> Option<Outbound> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|c| c.outbound.clone())
    }

    pub async fn rooms_of(&self, connection_id: ConnectionId) -> HashSet<String> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|c| c.rooms.clone())
            .unwrap_or_default()
    }

    pub async fn is_in_room(&self, connection_id: ConnectionId, room_id: &str) -> bool {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .is_some_and(|c| c.rooms.contains(room_id))
    }

    /// Record a joined room. False when the connection is gone.
    pub async fn add_room(&self, connection_id: ConnectionId, room_id: &str) -> bool {
        match self.connections.write().await.get_mut(&connection_id) {
            Some(connection) => {
                connection.rooms.insert(room_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Drop a joined room. False when the connection was not in it.
    pub async fn remove_room(&self, connection_id: ConnectionId, room_id: &str) -> bool {
        self.connections
            .write()
            .await
            .get_mut(&connection_id)
            .is_some_and(|c| c.rooms.remove(room_id))
    }

    /// Send a message to one connection
    pub async fn send(&self, connection_id: ConnectionId, message: &ServerMessage) -> Result<(), DeliveryError> {
        let outbound = self
            .outbound(connection_id)
            .await
            .ok_or(DeliveryError::ConnectionClosed(connection_id))?;
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize message for {}: {}", connection_id, e);
                return Ok(());
            }
        };
        outbound.send(text).map_err(|_| {
            debug!("Outbound queue of {} is closed", connection_id);
            DeliveryError::ConnectionClosed(connection_id)
        })
    }

    pub async fn stats(&self) -> RegistryStats {
        let connections = self.connections.read().await;
        RegistryStats {
            connections: connections.len(),
            authenticated: connections.values().filter(|c| c.user.is_some()).count(),
        }
    }
}
