use tracing::{error, warn};

use crate::models::{Identity, ParticipantInfo, ServerMessage};
use crate::ws::registry::{ConnectionId, Outbound};

/// A connection's seat in a room
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user: Identity,
    pub outbound: Outbound,
}

impl Participant {
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            connection_id: self.connection_id,
            user: self.user.clone(),
        }
    }
}

/// Deliver `message` to one participant. False when its queue is closed.
pub fn send_to(room_id: &str, participant: &Participant, message: &ServerMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => deliver(room_id, participant, text),
        Err(e) => {
            error!("Failed to serialize message for room {}: {}", room_id, e);
            true
        }
    }
}

/// Fan `message` out to every participant except `exclude`.
///
/// Serializes once. A closed recipient never stops delivery to the rest; the
/// ids of recipients that could not be reached are returned for cleanup.
pub fn broadcast_to_room(
    room_id: &str,
    participants: &[Participant],
    message: &ServerMessage,
    exclude: Option<ConnectionId>,
) -> Vec<ConnectionId> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize broadcast for room {}: {}", room_id, e);
            return Vec::new();
        }
    };

    participants
        .iter()
        .filter(|p| Some(p.connection_id) != exclude)
        .filter(|p| !deliver(room_id, p, text.clone()))
        .map(|p| p.connection_id)
        .collect()
}

fn deliver(room_id: &str, participant: &Participant, text: String) -> bool {
    if participant.outbound.send(text).is_err() {
        warn!(
            "Delivery to connection {} in room {} failed; scheduling cleanup",
            participant.connection_id, room_id
        );
        return false;
    }
    true
}
