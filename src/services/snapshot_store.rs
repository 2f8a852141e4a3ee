use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use tracing::{error, info, warn};

use crate::error::PersistenceError;
use crate::ws::document::DocumentState;

/// Durable key-value home of room snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the snapshot stored for `room_id`, if one exists and has not expired.
    async fn load(&self, room_id: &str) -> Result<Option<DocumentState>, PersistenceError>;

    /// Replace the snapshot for `room_id`, resetting its time to live.
    async fn save(&self, room_id: &str, state: &DocumentState, ttl: Duration) -> Result<(), PersistenceError>;

    fn backend(&self) -> &'static str;
}

pub fn snapshot_key(room_id: &str) -> String {
    format!("collab:snapshot:{}", room_id)
}

/// How often and how patiently snapshot I/O is retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up, doubling the
    /// pause after every failure.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, PersistenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!("{} failed (attempt {}/{}): {}; retrying in {:?}", what, attempt, attempts, e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    error!("{} failed after {} attempts: {}", what, attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

#[derive(Clone)]
struct StoredSnapshot {
    payload: String,
    ttl: Duration,
}

struct SnapshotExpiry;

impl Expiry<String, StoredSnapshot> for SnapshotExpiry {
    fn expire_after_create(&self, _key: &String, value: &StoredSnapshot, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredSnapshot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Process-local snapshot store. Used when no database is configured; state
/// survives room eviction but not a restart.
pub struct MemorySnapshotStore {
    cache: Cache<String, StoredSnapshot>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .expire_after(SnapshotExpiry)
            .build();
        info!("In-memory snapshot store initialized");
        Self { cache }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, room_id: &str) -> Result<Option<DocumentState>, PersistenceError> {
        match self.cache.get(&snapshot_key(room_id)).await {
            Some(stored) => Ok(Some(serde_json::from_str(&stored.payload)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, room_id: &str, state: &DocumentState, ttl: Duration) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(state)?;
        self.cache
            .insert(snapshot_key(room_id), StoredSnapshot { payload, ttl })
            .await;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::document::DocumentLog;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn memory_store_round_trips_state() {
        let store = MemorySnapshotStore::new();
        let mut log = DocumentLog::new(10);
        log.apply("u1", json!({"insert":"hi"}));
        log.apply("u2", json!({"insert":"!"}));

        store.save("r1", log.state(), Duration::from_secs(60)).await.unwrap();
        let loaded = store.load("r1").await.unwrap().expect("snapshot");
        assert_eq!(&loaded, log.state());
        assert!(store.load("r2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemorySnapshotStore::new();
        store
            .save("r1", &DocumentState::default(), Duration::from_millis(50))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(store.load("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run("save", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PersistenceError::Unavailable("down".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let value = policy
            .run("load", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PersistenceError::Unavailable("flaky".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }
}
