use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins (comma separated)
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Cloud service identifiers
    #[serde(default = "default_service_name")]
    pub cloud_service_name: String,

    /// JWT secret key shared with the token issuer
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL for the snapshot store
    pub db_url: Option<String>,

    /// How long a snapshot survives without the room being touched
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,

    /// Number of updates kept in memory per room
    #[serde(default = "default_max_room_updates")]
    pub max_room_updates: usize,

    /// Snapshot read/write attempts before giving up
    #[serde(default = "default_persist_max_attempts")]
    pub persist_max_attempts: u32,

    /// Initial backoff between snapshot attempts, doubled each retry
    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,

    /// Interval of the expired snapshot sweep
    #[serde(default = "default_snapshot_purge_interval_secs")]
    pub snapshot_purge_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tracing filter used when RUST_LOG is not set
    pub fn log_filter(&self) -> String {
        format!("colabri_sync=debug,tower_http=debug,{}", self.log_level)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_backoff_ms)
    }

    pub fn snapshot_purge_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_purge_interval_secs.max(1))
    }

    /// The configured CORS origins, trimmed and without empty entries
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            cloud_service_name: default_service_name(),
            cloud_auth_jwt_secret: None,
            db_url: None,
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            max_room_updates: default_max_room_updates(),
            persist_max_attempts: default_persist_max_attempts(),
            persist_backoff_ms: default_persist_backoff_ms(),
            snapshot_purge_interval_secs: default_snapshot_purge_interval_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colabri-sync".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_snapshot_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_room_updates() -> usize {
    100
}

fn default_persist_max_attempts() -> u32 {
    5
}

fn default_persist_backoff_ms() -> u64 {
    200
}

fn default_snapshot_purge_interval_secs() -> u64 {
    60 * 60
}
