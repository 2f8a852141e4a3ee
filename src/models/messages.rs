use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::models::Identity;
use crate::ws::document::DocumentState;
use crate::ws::registry::ConnectionId;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthMessage {
    #[serde(default)]
    pub token: Option<String>,
}

/// join, leave and sync only name the room
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub room_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub room_id: String,
    pub update: Value,
}

/// cursor, selection and awareness: everything besides the room is relayed as-is
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PresenceMessage {
    pub room_id: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "auth")]
    Auth(AuthMessage),
    #[serde(rename = "join")]
    Join(RoomMessage),
    #[serde(rename = "leave")]
    Leave(RoomMessage),
    #[serde(rename = "update")]
    Update(UpdateMessage),
    #[serde(rename = "cursor")]
    Cursor(PresenceMessage),
    #[serde(rename = "selection")]
    Selection(PresenceMessage),
    #[serde(rename = "awareness")]
    Awareness(PresenceMessage),
    #[serde(rename = "sync")]
    Sync(RoomMessage),
    #[serde(rename = "ping")]
    Ping,
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Cursor,
    Selection,
    Awareness,
}

/// A room member as shown to other members
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub connection_id: ConnectionId,
    #[serde(flatten)]
    pub user: Identity,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceBroadcast {
    pub room_id: String,
    pub user_id: String,
    pub user: Identity,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Connected {
        connection_id: ConnectionId,
    },
    Authenticated {
        user: Identity,
    },
    Joined {
        room_id: String,
        participants: Vec<ParticipantInfo>,
        state: DocumentState,
    },
    UserJoined {
        room_id: String,
        user: Identity,
        participants: Vec<ParticipantInfo>,
    },
    UserLeft {
        room_id: String,
        user: Identity,
        participants: Vec<ParticipantInfo>,
    },
    Update {
        room_id: String,
        update: Value,
        version: u64,
        user_id: String,
    },
    Cursor(PresenceBroadcast),
    Selection(PresenceBroadcast),
    Awareness(PresenceBroadcast),
    SyncResponse {
        room_id: String,
        state: DocumentState,
    },
    Pong {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into() }
    }

    pub fn presence(kind: PresenceKind, broadcast: PresenceBroadcast) -> Self {
        match kind {
            PresenceKind::Cursor => ServerMessage::Cursor(broadcast),
            PresenceKind::Selection => ServerMessage::Selection(broadcast),
            PresenceKind::Awareness => ServerMessage::Awareness(broadcast),
        }
    }
}
