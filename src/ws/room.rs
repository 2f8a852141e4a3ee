use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::CollabError;
use crate::models::{ParticipantInfo, PresenceBroadcast, PresenceKind, ServerMessage};
use crate::services::snapshot_store::SnapshotStore;
use crate::ws::broadcast::{broadcast_to_room, send_to, Participant};
use crate::ws::document::{DocumentLog, DocumentState};
use crate::ws::registry::ConnectionId;
use crate::ws::room_store::RoomStore;

/// What a joiner gets back: the member list and state it was sent
#[derive(Debug, Clone)]
pub struct JoinAck {
    pub participants: Vec<ParticipantInfo>,
    pub state: DocumentState,
}

pub enum RoomCommand {
    Join {
        participant: Participant,
        done: oneshot::Sender<JoinAck>,
    },
    Leave {
        connection_id: ConnectionId,
        done: oneshot::Sender<bool>,
    },
    Update {
        connection_id: ConnectionId,
        update: Value,
        done: oneshot::Sender<Result<u64, CollabError>>,
    },
    Presence {
        connection_id: ConnectionId,
        kind: PresenceKind,
        payload: Map<String, Value>,
    },
    Sync {
        connection_id: ConnectionId,
        done: oneshot::Sender<Result<DocumentState, CollabError>>,
    },
}

/// Sole owner of one room's participants and document. Every command for the
/// room goes through its queue, so updates are versioned in arrival order and
/// a joiner's state capture cannot interleave with another command.
pub(crate) struct RoomActor {
    room_id: String,
    generation: u64,
    participants: Vec<Participant>,
    document: DocumentLog,
    store: RoomStore,
}

impl RoomActor {
    pub(crate) fn new(room_id: String, generation: u64, store: RoomStore) -> Self {
        let capacity = store.settings().max_updates;
        Self {
            room_id,
            generation,
            participants: Vec::new(),
            document: DocumentLog::new(capacity),
            store,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<RoomCommand>) {
        self.load().await;

        while let Some(command) = commands.recv().await {
            self.handle(command);

            if self.participants.is_empty() && self.evict(&commands).await {
                break;
            }
        }
        debug!("Room {} actor stopped", self.room_id);
    }

    async fn load(&mut self) {
        let settings = self.store.settings();
        let snapshots = self.store.snapshots();
        let store: &dyn SnapshotStore = snapshots.as_ref();
        let room_id = self.room_id.clone();
        let what = format!("Loading snapshot for room {}", room_id);
        let key = room_id.as_str();

        match settings.retry.run(&what, move || store.load(key)).await {
            Ok(Some(state)) => {
                info!(
                    "Room {} restored from snapshot at version {} ({} updates retained)",
                    self.room_id,
                    state.version,
                    state.updates.len()
                );
                self.document = DocumentLog::from_snapshot(state, settings.max_updates);
            }
            Ok(None) => info!("Room {} created with an empty document", self.room_id),
            Err(e) => error!(
                "Room {} starts empty; snapshot could not be read: {}. Any existing snapshot will be replaced when the room is evicted",
                self.room_id, e
            ),
        }
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join { participant, done } => {
                let ack = self.join(participant);
                let _ = done.send(ack);
            }
            RoomCommand::Leave { connection_id, done } => {
                let left = self.leave(connection_id);
                let _ = done.send(left);
            }
            RoomCommand::Update { connection_id, update, done } => {
                let _ = done.send(self.apply_update(connection_id, update));
            }
            RoomCommand::Presence { connection_id, kind, payload } => {
                self.relay_presence(connection_id, kind, payload);
            }
            RoomCommand::Sync { connection_id, done } => {
                let _ = done.send(self.sync(connection_id));
            }
        }
    }

    fn join(&mut self, participant: Participant) -> JoinAck {
        let connection_id = participant.connection_id;
        let user = participant.user.clone();
        let rejoin = match self.participants.iter_mut().find(|p| p.connection_id == connection_id) {
            Some(existing) => {
                *existing = participant;
                true
            }
            None => {
                self.participants.push(participant);
                self.store.participant_seated();
                false
            }
        };

        let ack = JoinAck {
            participants: self.participant_infos(),
            state: self.document.sync(),
        };
        info!(
            "Connection {} ({}) joined room {} at version {} ({} participants)",
            connection_id,
            user.id,
            self.room_id,
            ack.state.version,
            ack.participants.len()
        );

        let joined = ServerMessage::Joined {
            room_id: self.room_id.clone(),
            participants: ack.participants.clone(),
            state: ack.state.clone(),
        };
        let delivered = self
            .participants
            .iter()
            .find(|p| p.connection_id == connection_id)
            .is_some_and(|p| send_to(&self.room_id, p, &joined));

        let mut dead = Vec::new();
        if !delivered {
            dead.push(connection_id);
        } else if !rejoin {
            let user_joined = ServerMessage::UserJoined {
                room_id: self.room_id.clone(),
                user,
                participants: ack.participants.clone(),
            };
            dead = broadcast_to_room(&self.room_id, &self.participants, &user_joined, Some(connection_id));
        }
        self.drop_dead(dead);
        ack
    }

    fn leave(&mut self, connection_id: ConnectionId) -> bool {
        let Some(index) = self.participants.iter().position(|p| p.connection_id == connection_id) else {
            return false;
        };
        let participant = self.participants.remove(index);
        self.store.participant_unseated();
        info!(
            "Connection {} ({}) left room {} ({} participants remain)",
            connection_id,
            participant.user.id,
            self.room_id,
            self.participants.len()
        );
        let dead = self.announce_departure(participant);
        self.drop_dead(dead);
        true
    }

    fn apply_update(&mut self, connection_id: ConnectionId, update: Value) -> Result<u64, CollabError> {
        let user_id = self
            .participant(connection_id)
            .map(|p| p.user.id.clone())
            .ok_or_else(|| CollabError::RoomNotFound(self.room_id.clone()))?;

        let version = self.document.apply(&user_id, update.clone());
        debug!("Room {} accepted update v{} from {}", self.room_id, version, user_id);

        let message = ServerMessage::Update {
            room_id: self.room_id.clone(),
            update,
            version,
            user_id,
        };
        let dead = broadcast_to_room(&self.room_id, &self.participants, &message, Some(connection_id));
        self.drop_dead(dead);
        Ok(version)
    }

    fn relay_presence(&mut self, connection_id: ConnectionId, kind: PresenceKind, mut payload: Map<String, Value>) {
        let Some(user) = self.participant(connection_id).map(|p| p.user.clone()) else {
            debug!("Dropping {:?} from non-member {} in room {}", kind, connection_id, self.room_id);
            return;
        };
        // The server stamps identity; clients cannot supply their own.
        payload.remove("userId");
        payload.remove("user");

        let message = ServerMessage::presence(
            kind,
            PresenceBroadcast {
                room_id: self.room_id.clone(),
                user_id: user.id.clone(),
                user,
                payload,
            },
        );
        let dead = broadcast_to_room(&self.room_id, &self.participants, &message, Some(connection_id));
        self.drop_dead(dead);
    }

    fn sync(&mut self, connection_id: ConnectionId) -> Result<DocumentState, CollabError> {
        let state = self.document.sync();
        let Some(participant) = self.participant(connection_id) else {
            return Err(CollabError::RoomNotFound(self.room_id.clone()));
        };
        let response = ServerMessage::SyncResponse {
            room_id: self.room_id.clone(),
            state: state.clone(),
        };
        if !send_to(&self.room_id, participant, &response) {
            self.drop_dead(vec![connection_id]);
        }
        Ok(state)
    }

    fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.connection_id == connection_id)
    }

    fn participant_infos(&self) -> Vec<ParticipantInfo> {
        self.participants.iter().map(Participant::info).collect()
    }

    fn announce_departure(&self, participant: Participant) -> Vec<ConnectionId> {
        let message = ServerMessage::UserLeft {
            room_id: self.room_id.clone(),
            user: participant.user,
            participants: self.participant_infos(),
        };
        broadcast_to_room(&self.room_id, &self.participants, &message, None)
    }

    /// Remove unreachable participants, tell the others, and hand the ids to
    /// the reaper for full connection cleanup.
    fn drop_dead(&mut self, mut dead: Vec<ConnectionId>) {
        while let Some(connection_id) = dead.pop() {
            let Some(index) = self.participants.iter().position(|p| p.connection_id == connection_id) else {
                continue;
            };
            let participant = self.participants.remove(index);
            self.store.participant_unseated();
            warn!("Removed unreachable connection {} from room {}", connection_id, self.room_id);
            self.store.reap(connection_id);
            dead.extend(self.announce_departure(participant));
        }
    }

    /// Persist and deregister an empty room. Returns false when a command
    /// arrived meanwhile and the room has to stay.
    async fn evict(&mut self, commands: &mpsc::UnboundedReceiver<RoomCommand>) -> bool {
        self.persist().await;
        let evicted = self
            .store
            .remove_if_idle(&self.room_id, self.generation, || commands.is_empty())
            .await;
        if evicted {
            info!("Room {} evicted from memory at version {}", self.room_id, self.document.version());
        } else {
            debug!("Room {} received new work while persisting; staying alive", self.room_id);
        }
        evicted
    }

    async fn persist(&self) {
        let state = self.document.state();
        if state.is_pristine() {
            debug!("Room {} has no history; skipping snapshot", self.room_id);
            return;
        }

        let settings = self.store.settings();
        let snapshots = self.store.snapshots();
        let store: &dyn SnapshotStore = snapshots.as_ref();
        let what = format!("Saving snapshot for room {}", self.room_id);
        let room_id = self.room_id.as_str();
        let ttl = settings.snapshot_ttl;

        match settings.retry.run(&what, move || store.save(room_id, state, ttl)).await {
            Ok(()) => info!(
                "Room {} snapshot saved at version {} via {}",
                self.room_id,
                state.version,
                store.backend()
            ),
            Err(e) => {
                // Accepted loss: the room is evicted anyway, but the state goes to the log.
                let dump = serde_json::to_string(state).unwrap_or_else(|_| "<unserializable>".to_string());
                error!(
                    "Room {} snapshot lost at version {}: {}. State: {}",
                    self.room_id, state.version, e, dump
                );
            }
        }
    }
}
