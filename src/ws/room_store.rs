use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CollabError;
use crate::models::PresenceKind;
use crate::services::snapshot_store::{RetryPolicy, SnapshotStore};
use crate::ws::broadcast::Participant;
use crate::ws::document::DocumentState;
use crate::ws::registry::ConnectionId;
use crate::ws::room::{JoinAck, RoomActor, RoomCommand};

/// Per-room tunables shared by every room actor
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub max_updates: usize,
    pub snapshot_ttl: Duration,
    pub retry: RetryPolicy,
}

impl RoomSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_updates: config.max_room_updates,
            snapshot_ttl: config.snapshot_ttl(),
            retry: RetryPolicy {
                max_attempts: config.persist_max_attempts,
                initial_backoff: config.persist_backoff(),
            },
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct RoomHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<RoomCommand>,
}

/// Live rooms by id. A room is an actor task; this map only routes commands
/// to it and is locked just long enough to enqueue one.
#[derive(Clone)]
pub struct RoomStore {
    rooms: Arc<Mutex<HashMap<String, RoomHandle>>>,
    snapshots: Arc<dyn SnapshotStore>,
    settings: RoomSettings,
    reaper: mpsc::UnboundedSender<ConnectionId>,
    next_generation: Arc<AtomicU64>,
    participants: Arc<AtomicUsize>,
}

impl RoomStore {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        settings: RoomSettings,
        reaper: mpsc::UnboundedSender<ConnectionId>,
    ) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            snapshots,
            settings,
            reaper,
            next_generation: Arc::new(AtomicU64::new(1)),
            participants: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> RoomSettings {
        self.settings
    }

    pub fn snapshots(&self) -> Arc<dyn SnapshotStore> {
        self.snapshots.clone()
    }

    /// Add a participant, creating the room (and loading its snapshot) when
    /// it is not in memory. The joiner receives `joined` before any later
    /// room traffic.
    pub async fn join(&self, room_id: &str, participant: Participant) -> Result<JoinAck, CollabError> {
        let (done, ack) = oneshot::channel();
        self.dispatch(room_id, RoomCommand::Join { participant, done }, true).await?;
        ack.await.map_err(|_| CollabError::RoomClosed(room_id.to_string()))
    }

    /// Remove a participant. An empty room is persisted and evicted.
    pub async fn leave(&self, room_id: &str, connection_id: ConnectionId) -> Result<bool, CollabError> {
        let (done, left) = oneshot::channel();
        self.dispatch(room_id, RoomCommand::Leave { connection_id, done }, false).await?;
        left.await.map_err(|_| CollabError::RoomClosed(room_id.to_string()))
    }

    /// Append an opaque update and fan it out; returns the assigned version.
    pub async fn apply_update(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
        update: Value,
    ) -> Result<u64, CollabError> {
        let (done, version) = oneshot::channel();
        self.dispatch(room_id, RoomCommand::Update { connection_id, update, done }, false).await?;
        version.await.map_err(|_| CollabError::RoomClosed(room_id.to_string()))?
    }

    pub async fn relay_presence(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
        kind: PresenceKind,
        payload: Map<String, Value>,
    ) -> Result<(), CollabError> {
        self.dispatch(room_id, RoomCommand::Presence { connection_id, kind, payload }, false).await
    }

    /// Current state of the room; the requester is also sent `sync_response`.
    pub async fn sync(&self, room_id: &str, connection_id: ConnectionId) -> Result<DocumentState, CollabError> {
        let (done, state) = oneshot::channel();
        self.dispatch(room_id, RoomCommand::Sync { connection_id, done }, false).await?;
        state.await.map_err(|_| CollabError::RoomClosed(room_id.to_string()))?
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.rooms.lock().await.contains_key(room_id)
    }

    /// Participants seated across all live rooms
    pub fn participant_count(&self) -> usize {
        self.participants.load(Ordering::Relaxed)
    }

    pub(crate) fn participant_seated(&self) {
        self.participants.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn participant_unseated(&self) {
        self.participants.fetch_sub(1, Ordering::Relaxed);
    }

    async fn dispatch(&self, room_id: &str, command: RoomCommand, create: bool) -> Result<(), CollabError> {
        let mut rooms = self.rooms.lock().await;

        let command = match rooms.get(room_id) {
            Some(handle) => match handle.commands.send(command) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(command)) => {
                    // The actor died without deregistering; replace it.
                    rooms.remove(room_id);
                    command
                }
            },
            None => command,
        };

        if !create {
            return Err(CollabError::RoomNotFound(room_id.to_string()));
        }

        let handle = self.spawn_room(room_id);
        handle
            .commands
            .send(command)
            .map_err(|_| CollabError::RoomClosed(room_id.to_string()))?;
        rooms.insert(room_id.to_string(), handle);
        Ok(())
    }

    fn spawn_room(&self, room_id: &str) -> RoomHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (commands, rx) = mpsc::unbounded_channel();
        let actor = RoomActor::new(room_id.to_string(), generation, self.clone());
        tokio::spawn(actor.run(rx));
        info!("Room {} spawned (generation {})", room_id, generation);
        RoomHandle { generation, commands }
    }

    /// Deregister a room actor if it is still the registered one and `idle`
    /// holds while the map is locked.
    pub(crate) async fn remove_if_idle(&self, room_id: &str, generation: u64, idle: impl FnOnce() -> bool) -> bool {
        let mut rooms = self.rooms.lock().await;
        let registered = rooms.get(room_id).is_some_and(|h| h.generation == generation);
        if !registered {
            return true;
        }
        if !idle() {
            return false;
        }
        rooms.remove(room_id);
        true
    }

    pub(crate) fn reap(&self, connection_id: ConnectionId) {
        if self.reaper.send(connection_id).is_err() {
            debug!("Reaper is gone; connection {} not scheduled", connection_id);
        }
    }
}
