use crate::error::CollabError;
use crate::models::{PresenceKind, PresenceMessage};
use crate::websocket::router::MessageRouter;
use crate::ws::registry::ConnectionId;

/// Handle cursor, selection and awareness messages. Nothing is stored.
pub async fn handle_presence_message(
    presence_msg: PresenceMessage,
    kind: PresenceKind,
    connection_id: ConnectionId,
    router: &MessageRouter,
) -> Result<(), CollabError> {
    router.require_membership(connection_id, &presence_msg.room_id).await?;
    router
        .rooms
        .relay_presence(&presence_msg.room_id, connection_id, kind, presence_msg.payload)
        .await
}
