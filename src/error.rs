use thiserror::Error;

use crate::ws::registry::ConnectionId;

/// Token validation failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: missing token")]
    MissingToken,
    #[error("authentication failed: no signing secret configured")]
    MissingSecret,
    #[error("authentication failed: token expired")]
    Expired,
    #[error("authentication failed: invalid signature")]
    InvalidSignature,
    #[error("authentication failed: token has no user id")]
    MissingSubject,
    #[error("authentication failed: {0}")]
    Invalid(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Invalid(e.to_string()),
        }
    }
}

/// Inbound frame problems
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Malformed(String),
    #[error("unknown message type")]
    UnknownType,
    #[error("binary frames are not supported")]
    BinaryFrame,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

/// Snapshot store failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}

/// Everything a single inbound message can fail with. The `Display` text is
/// what the client receives in the `error` reply.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("room not found: {0}")]
    RoomNotFound(String),
    #[error("connection is not registered")]
    NotConnected,
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("room {0} closed before the request completed")]
    RoomClosed(String),
}
