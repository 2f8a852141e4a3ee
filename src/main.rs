use std::panic;
use std::sync::Arc;

use colabri_sync::config::Config;
use colabri_sync::db::dbsnapshot::PgSnapshotStore;
use colabri_sync::services::snapshot_store::{MemorySnapshotStore, SnapshotStore};
use colabri_sync::{create_app, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing; the filter is narrowed to LOG_LEVEL once the
    // configuration is known, unless RUST_LOG is set.
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| Config::default().log_filter().into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if std::env::var_os("RUST_LOG").is_none() {
        if let Err(e) = filter_handle.reload(EnvFilter::new(config.log_filter())) {
            warn!("Failed to apply LOG_LEVEL {}: {}", config.log_level, e);
        }
    }

    info!("Starting {}...", config.cloud_service_name);

    let snapshots = init_snapshot_store(&config).await;
    let app_state = AppState::new(config.clone(), snapshots);
    let app_routes = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }
    info!("Server stopped");
}

/// Postgres when a database is configured and reachable, memory otherwise
async fn init_snapshot_store(config: &Config) -> Arc<dyn SnapshotStore> {
    let Some(db_url) = &config.db_url else {
        warn!("No database URL configured - room snapshots will not survive a restart");
        return Arc::new(MemorySnapshotStore::new());
    };

    match PgSnapshotStore::connect(db_url).await {
        Ok(store) => {
            let store = Arc::new(store);
            store.clone().spawn_purge_task(config.snapshot_purge_interval());
            info!("Database initialized successfully");
            store
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            warn!("Falling back to in-memory snapshots");
            Arc::new(MemorySnapshotStore::new())
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
