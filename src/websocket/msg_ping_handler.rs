use chrono::Utc;
use tracing::debug;

use crate::error::CollabError;
use crate::models::ServerMessage;
use crate::websocket::router::MessageRouter;
use crate::ws::registry::ConnectionId;

/// Handle PingMessage - reply with the server time
pub async fn handle_ping_message(connection_id: ConnectionId, router: &MessageRouter) -> Result<(), CollabError> {
    debug!("Ping received from {}", connection_id);
    let pong = ServerMessage::Pong { timestamp: Utc::now().timestamp_millis() };
    router.reply(connection_id, &pong).await
}
