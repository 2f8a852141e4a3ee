use tracing::debug;

use crate::error::CollabError;
use crate::models::UpdateMessage;
use crate::websocket::router::MessageRouter;
use crate::ws::registry::ConnectionId;

/// Handle UpdateMessage - version it in the room and relay to the others
pub async fn handle_update_message(update_msg: UpdateMessage, connection_id: ConnectionId, router: &MessageRouter) -> Result<(), CollabError> {
    router.require_membership(connection_id, &update_msg.room_id).await?;

    let version = router
        .rooms
        .apply_update(&update_msg.room_id, connection_id, update_msg.update)
        .await?;
    debug!("Update from {} in room {} is version {}", connection_id, update_msg.room_id, version);
    Ok(())
}
