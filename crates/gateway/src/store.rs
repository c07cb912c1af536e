//! Counter stores backing the rate limiter.
//!
//! A counter store offers a single atomic operation: increment a key and
//! return the new value, arming the key's expiry when the increment created
//! it. Redis is the production backend; the in-memory store backs tests and
//! local runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use thiserror::Error;
use tokio::sync::OnceCell;

/// INCR followed by EXPIRE on first creation, executed atomically so a crash
/// between the two commands cannot leave a counter without a TTL.
const INCREMENT_SCRIPT: &str = r"local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count";

/// Reconnect attempts per connect before the caller sees an error. Kept low
/// because a rate-limited request waits on the connect.
const CONNECT_RETRIES: usize = 1;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Counter store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic, expiring counters keyed by string.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count.
    ///
    /// When the increment creates the key, its expiry is set to `window`.
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Redis-backed counter store.
///
/// Holds one shared connection, opened on first use and reconnected by the
/// connection manager after failures. A failed first connect leaves the slot
/// empty so the next call tries again.
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    script: redis::Script,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl RedisCounterStore {
    /// Create a store for `url`. No connection is made until first use.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            script: redis::Script::new(INCREMENT_SCRIPT),
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// Whether the shared connection has been established.
    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| {
                let config = ConnectionManagerConfig::new()
                    .set_number_of_retries(CONNECT_RETRIES)
                    .set_connection_timeout(CONNECT_TIMEOUT);
                ConnectionManager::new_with_config(self.client.clone(), config)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;

        let count: i64 = self
            .script
            .key(key)
            .arg(window.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;

        u64::try_from(count)
            .map_err(|_| StoreError::Unavailable(format!("negative counter for {key}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u64,
    expires_at: Instant,
}

/// Key count above which expired windows are swept on increment.
const PRUNE_THRESHOLD: usize = 1024;

/// In-process counter store.
///
/// Counters live only as long as the process and are not shared between
/// gateway instances. Expired windows are dropped once the map grows past
/// [`PRUNE_THRESHOLD`] keys.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, WindowEntry>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current count for `key`, if its window is still open.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.count)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        // Must run before `entry()` takes a shard lock.
        if self.entries.len() > PRUNE_THRESHOLD {
            self.entries.retain(|_, entry| entry.expires_at > now);
        }

        let fresh = WindowEntry {
            count: 0,
            expires_at: now + window,
        };

        // The shard lock is held for the whole read-modify-write.
        let mut entry = self.entries.entry(key.to_string()).or_insert(fresh);
        if entry.expires_at <= now {
            *entry = fresh;
        }
        entry.count += 1;
        Ok(entry.count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
