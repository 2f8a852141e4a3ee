use tracing::info;

use crate::error::{AuthError, CollabError};
use crate::models::{AuthMessage, ServerMessage};
use crate::services::auth_service::authenticate;
use crate::websocket::router::MessageRouter;
use crate::ws::registry::ConnectionId;

/// Handle AuthMessage
pub async fn handle_auth_message(auth_msg: &AuthMessage, connection_id: ConnectionId, router: &MessageRouter) -> Result<(), CollabError> {
    let token = auth_msg.token.as_deref().ok_or(AuthError::MissingToken)?;
    let user = authenticate(token, router.jwt_secret())?;

    if !router.registry.mark_authenticated(connection_id, user.clone()).await {
        return Err(CollabError::NotConnected);
    }
    info!("Connection {} authenticated as {} ({})", connection_id, user.id, user.name);

    router.reply(connection_id, &ServerMessage::Authenticated { user }).await
}
