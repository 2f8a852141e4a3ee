pub mod handler;
pub mod msg_auth_handler;
pub mod msg_ping_handler;
pub mod msg_presence_handler;
pub mod msg_room_handler;
pub mod msg_update_handler;
pub mod router;
