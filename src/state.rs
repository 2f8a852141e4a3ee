use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Config;
use crate::services::snapshot_store::SnapshotStore;
use crate::websocket::router::MessageRouter;
use crate::ws::registry::{ConnectionId, ConnectionRegistry};
use crate::ws::room_store::{RoomSettings, RoomStore};

/// Shared application state handed to every axum handler
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomStore,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    /// Wire the registry, room store and router together and start the
    /// reaper that closes connections found dead during a broadcast.
    /// Must be called inside a tokio runtime.
    pub fn new(config: Config, snapshots: Arc<dyn SnapshotStore>) -> Arc<Self> {
        let (reaper, dead) = mpsc::unbounded_channel();
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = RoomStore::new(snapshots, RoomSettings::from_config(&config), reaper);
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            rooms.clone(),
            config.cloud_auth_jwt_secret.clone(),
        ));

        tokio::spawn(run_reaper(router.clone(), dead));

        Arc::new(Self {
            config,
            registry,
            rooms,
            router,
        })
    }
}

async fn run_reaper(router: Arc<MessageRouter>, mut dead: mpsc::UnboundedReceiver<ConnectionId>) {
    while let Some(connection_id) = dead.recv().await {
        debug!("Reaping dead connection {}", connection_id);
        router.close(connection_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::services::snapshot_store::MemorySnapshotStore;
    use std::time::Duration;

    async fn open_authenticated(state: &AppState, user: &str) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let connection_id = state.registry.on_open(outbound).await;
        assert!(state.registry.mark_authenticated(connection_id, Identity::new(user, user, None)).await);
        (connection_id, rx)
    }

    #[tokio::test]
    async fn reaper_closes_connections_that_stopped_reading() {
        let state = AppState::new(Config::default(), Arc::new(MemorySnapshotStore::new()));
        let (alice, mut alice_rx) = open_authenticated(&state, "alice").await;
        let (bob, bob_rx) = open_authenticated(&state, "bob").await;
        state.router.handle_text(alice, r#"{"type":"join","roomId":"r1"}"#).await;
        state.router.handle_text(bob, r#"{"type":"join","roomId":"r1"}"#).await;
        assert_eq!(state.registry.stats().await.connections, 2);
        assert_eq!(state.rooms.participant_count(), 2);

        drop(bob_rx);
        state
            .router
            .handle_text(alice, r#"{"type":"update","roomId":"r1","update":"x"}"#)
            .await;

        let mut reaped = false;
        for _ in 0..200 {
            if !state.registry.contains(bob).await {
                reaped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(reaped, "dead connection was never closed");
        assert_eq!(state.registry.stats().await.connections, 1);
        assert_eq!(state.rooms.participant_count(), 1);

        let mut types = Vec::new();
        while let Ok(text) = alice_rx.try_recv() {
            let message: serde_json::Value = serde_json::from_str(&text).unwrap();
            types.push(message["type"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(types, ["joined", "user_joined", "user_left"]);
    }
}
