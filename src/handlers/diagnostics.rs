use std::sync::{Arc, Mutex, OnceLock};

use axum::{
    extract::{Extension, State},
    Json,
};
use sysinfo::System;
use tracing::info;

use crate::models::{DiagnosticsResponse, Identity};
use crate::state::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Operational counters for the collaboration server
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(caller): Extension<Identity>,
) -> Json<DiagnosticsResponse> {
    let stats = app_state.registry.stats().await;
    let n_rooms = app_state.rooms.room_count().await;
    let n_participants = app_state.rooms.participant_count();

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics for {}: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Auth: {}, Rooms: {}, Participants: {}",
        caller.id,
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.connections,
        stats.authenticated,
        n_rooms,
        n_participants
    );

    Json(DiagnosticsResponse {
        n_conn: stats.connections as u32,
        n_authenticated: stats.authenticated as u32,
        n_rooms: n_rooms as u32,
        n_participants: n_participants as u32,
        snapshot_backend: app_state.rooms.snapshots().backend().to_string(),
        cpu_usage,
        memory_alloc,
        memory_total,
        memory_free,
    })
}
