use tracing::{info, warn};

use crate::error::CollabError;
use crate::models::{Identity, RoomMessage};
use crate::websocket::router::MessageRouter;
use crate::ws::broadcast::Participant;
use crate::ws::registry::ConnectionId;

/// Handle JoinMessage. The room actor replies `joined` and announces the
/// newcomer itself.
pub async fn handle_join_message(join_msg: &RoomMessage, connection_id: ConnectionId, user: Identity, router: &MessageRouter) -> Result<(), CollabError> {
    let room_id = join_msg.room_id.as_str();
    let outbound = router
        .registry
        .outbound(connection_id)
        .await
        .ok_or(CollabError::NotConnected)?;
    if !router.registry.add_room(connection_id, room_id).await {
        return Err(CollabError::NotConnected);
    }

    let participant = Participant {
        connection_id,
        user,
        outbound,
    };
    if let Err(e) = router.rooms.join(room_id, participant).await {
        router.registry.remove_room(connection_id, room_id).await;
        return Err(e);
    }

    // Closed while the join was in flight: close() did not see this room yet.
    if !router.registry.contains(connection_id).await {
        warn!("Connection {} closed during join of room {}", connection_id, room_id);
        match router.rooms.leave(room_id, connection_id).await {
            Ok(_) | Err(CollabError::RoomNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Handle LeaveMessage
pub async fn handle_leave_message(leave_msg: &RoomMessage, connection_id: ConnectionId, router: &MessageRouter) -> Result<(), CollabError> {
    let room_id = leave_msg.room_id.as_str();
    if !router.registry.remove_room(connection_id, room_id).await {
        return Err(CollabError::RoomNotFound(room_id.to_string()));
    }
    router.rooms.leave(room_id, connection_id).await?;
    info!("Connection {} left room {}", connection_id, room_id);
    Ok(())
}

/// Handle SyncMessage. The room actor sends `sync_response` in line with its
/// other traffic.
pub async fn handle_sync_message(sync_msg: &RoomMessage, connection_id: ConnectionId, router: &MessageRouter) -> Result<(), CollabError> {
    router.require_membership(connection_id, &sync_msg.room_id).await?;
    router.rooms.sync(&sync_msg.room_id, connection_id).await?;
    Ok(())
}
