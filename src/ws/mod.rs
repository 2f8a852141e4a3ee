pub mod broadcast;
pub mod document;
pub mod registry;
pub mod room;
pub mod room_store;
