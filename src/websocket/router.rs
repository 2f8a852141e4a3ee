use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CollabError, ProtocolError};
use crate::models::{ClientMessage, PresenceKind, ServerMessage};
use crate::websocket::msg_auth_handler::handle_auth_message;
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_presence_handler::handle_presence_message;
use crate::websocket::msg_room_handler::{handle_join_message, handle_leave_message, handle_sync_message};
use crate::websocket::msg_update_handler::handle_update_message;
use crate::ws::registry::{ConnectionId, ConnectionRegistry};
use crate::ws::room_store::RoomStore;

/// Per-connection protocol state machine: parses a frame, enforces
/// auth-before-anything-else and dispatches to the message handlers.
pub struct MessageRouter {
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomStore,
    jwt_secret: Option<String>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: RoomStore, jwt_secret: Option<String>) -> Self {
        Self {
            registry,
            rooms,
            jwt_secret,
        }
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref()
    }

    /// Handle one text frame. Failures become an `error` reply; the
    /// connection always stays open.
    pub async fn handle_text(&self, connection_id: ConnectionId, text: &str) {
        if !self.registry.contains(connection_id).await {
            debug!("Ignoring frame from closed connection {}", connection_id);
            return;
        }
        if let Err(e) = self.dispatch(connection_id, text).await {
            self.reply_error(connection_id, e).await;
        }
    }

    /// Binary frames carry nothing this protocol understands
    pub async fn handle_binary(&self, connection_id: ConnectionId) {
        self.reply_error(connection_id, ProtocolError::BinaryFrame.into()).await;
    }

    async fn dispatch(&self, connection_id: ConnectionId, text: &str) -> Result<(), CollabError> {
        let message = ClientMessage::parse(text)?;

        let user = match message {
            ClientMessage::Auth(ref auth_msg) => return handle_auth_message(auth_msg, connection_id, self).await,
            ClientMessage::Unknown => return Err(ProtocolError::UnknownType.into()),
            _ => self
                .registry
                .identity(connection_id)
                .await
                .ok_or(CollabError::NotAuthenticated)?,
        };

        match message {
            ClientMessage::Join(join_msg) => handle_join_message(&join_msg, connection_id, user, self).await,
            ClientMessage::Leave(leave_msg) => handle_leave_message(&leave_msg, connection_id, self).await,
            ClientMessage::Update(update_msg) => handle_update_message(update_msg, connection_id, self).await,
            ClientMessage::Cursor(presence_msg) => {
                handle_presence_message(presence_msg, PresenceKind::Cursor, connection_id, self).await
            }
            ClientMessage::Selection(presence_msg) => {
                handle_presence_message(presence_msg, PresenceKind::Selection, connection_id, self).await
            }
            ClientMessage::Awareness(presence_msg) => {
                handle_presence_message(presence_msg, PresenceKind::Awareness, connection_id, self).await
            }
            ClientMessage::Sync(sync_msg) => handle_sync_message(&sync_msg, connection_id, self).await,
            ClientMessage::Ping => handle_ping_message(connection_id, self).await,
            ClientMessage::Auth(_) | ClientMessage::Unknown => Ok(()),
        }
    }

    /// Tear down a connection: forget it and leave every room it joined.
    /// Safe to call more than once.
    pub async fn close(&self, connection_id: ConnectionId) {
        let Some(closed) = self.registry.on_close(connection_id).await else {
            return;
        };
        for room_id in closed.rooms {
            match self.rooms.leave(&room_id, connection_id).await {
                Ok(_) | Err(CollabError::RoomNotFound(_)) => {}
                Err(e) => warn!("Failed to leave room {} for {}: {}", room_id, connection_id, e),
            }
        }
    }

    /// Ensure the connection joined `room_id` before touching the room
    pub(crate) async fn require_membership(&self, connection_id: ConnectionId, room_id: &str) -> Result<(), CollabError> {
        if self.registry.is_in_room(connection_id, room_id).await {
            Ok(())
        } else {
            Err(CollabError::RoomNotFound(room_id.to_string()))
        }
    }

    pub(crate) async fn reply(&self, connection_id: ConnectionId, message: &ServerMessage) -> Result<(), CollabError> {
        Ok(self.registry.send(connection_id, message).await?)
    }

    async fn reply_error(&self, connection_id: ConnectionId, error: CollabError) {
        warn!("Rejected message from {}: {}", connection_id, error);
        let message = ServerMessage::error(error.to_string());
        if let Err(e) = self.registry.send(connection_id, &message).await {
            debug!("Could not deliver error reply: {}", e);
        }
    }
}
