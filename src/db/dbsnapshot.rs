use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::PersistenceError;
use crate::services::snapshot_store::{snapshot_key, SnapshotStore};
use crate::ws::document::DocumentState;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS collab_snapshots (
        key TEXT PRIMARY KEY,
        data JSONB NOT NULL,
        version BIGINT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_EXPIRY_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS collab_snapshots_expires_at_idx ON collab_snapshots (expires_at)";

/// When a snapshot written at `now` stops being visible
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, PersistenceError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| PersistenceError::Unavailable(format!("invalid snapshot ttl: {}", e)))?;
    now.checked_add_signed(ttl)
        .ok_or_else(|| PersistenceError::Unavailable("snapshot ttl overflows the expiry timestamp".to_string()))
}

/// Postgres-backed snapshot store. Expired rows are invisible to `load` and
/// removed by `purge_expired`.
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Connect to the database and make sure the snapshot table exists
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        info!("Connecting to snapshot database...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;

        info!("Snapshot database ready");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_EXPIRY_INDEX_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Delete every snapshot whose retention window has passed
    ///
    /// # Returns
    /// * the number of rows removed
    pub async fn purge_expired(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM collab_snapshots WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Periodically purge expired snapshots until the process exits
    pub fn spawn_purge_task(self: std::sync::Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.purge_expired().await {
                    Ok(0) => debug!("No expired snapshots to purge"),
                    Ok(n) => info!("Purged {} expired snapshots", n),
                    Err(e) => error!("Failed to purge expired snapshots: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, room_id: &str) -> Result<Option<DocumentState>, PersistenceError> {
        let row = sqlx::query("SELECT data FROM collab_snapshots WHERE key = $1 AND expires_at > NOW()")
            .bind(snapshot_key(room_id))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let Json(state): Json<DocumentState> = row.try_get("data")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, room_id: &str, state: &DocumentState, ttl: Duration) -> Result<(), PersistenceError> {
        let now = Utc::now();
        let expires_at = expiry_after(now, ttl)?;
        let version = i64::try_from(state.version)
            .map_err(|_| PersistenceError::Unavailable("snapshot version overflows BIGINT".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO collab_snapshots (key, data, version, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE
            SET data = EXCLUDED.data,
                version = EXCLUDED.version,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(snapshot_key(room_id))
        .bind(Json(state))
        .bind(version)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
