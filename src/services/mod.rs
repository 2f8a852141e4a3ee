pub mod auth_service;
pub mod snapshot_store;
