//! Redis counter store - one hash per identity holding `start` and `count`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};

use flood_core::domain::WindowRecord;
use flood_core::error::{FloodError, StoreError};
use flood_core::ports::CounterStore;

const START_FIELD: &str = "start";
const COUNT_FIELD: &str = "count";

/// Reads the window, then either counts in place or opens a new window.
/// Returns: [window_start_ms, count]
const HIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local ttl_ms = tonumber(ARGV[3])

local start = tonumber(redis.call('HGET', key, 'start'))
if start and now - start < window_ms then
    local count = redis.call('HINCRBY', key, 'count', 1)
    return {start, count}
end

redis.call('HSET', key, 'start', ARGV[1], 'count', 1)
if ttl_ms > 0 then
    redis.call('PEXPIRE', key, ttl_ms)
else
    redis.call('PERSIST', key)
end
return {now, 1}
"#;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

/// Redis counter store configuration.
#[derive(Debug, Clone)]
pub struct RedisCounterStoreConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix; an empty prefix uses the bare identity as the key
    pub key_prefix: String,
    /// Expire each window record once its window has passed
    pub expire_windows: bool,
}

impl Default for RedisCounterStoreConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "flood".to_string(),
            expire_windows: true,
        }
    }
}

impl RedisCounterStoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            key_prefix: std::env::var("FLOOD_KEY_PREFIX").unwrap_or_else(|_| "flood".to_string()),
            expire_windows: std::env::var("FLOOD_EXPIRE_WINDOWS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}

/// Redis-backed counter store.
///
/// `hit` runs as a single Lua script, so concurrent callers for one identity
/// can neither double-count a stale window nor both reset it.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisCounterStoreConfig,
    /// Lua script for the atomic read/rollover/increment
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisCounterStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.redis.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(url = %config.redis.url, prefix = %config.key_prefix, "Connected to Redis counter store");

        Ok(Self {
            conn,
            config,
            script: Script::new(HIT_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisCounterStoreConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        if self.config.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.key_prefix, key)
        }
    }

    fn ttl_millis(&self, window: Duration) -> i64 {
        if self.config.expire_windows {
            i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
        } else {
            0
        }
    }
}

fn store_error(e: RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

fn decode_start(key: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("window start {millis} is out of range"),
    })
}

fn decode_count(key: &str, count: i64) -> Result<u64, StoreError> {
    u64::try_from(count).map_err(|_| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("negative count {count}"),
    })
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn window_start(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let start: Option<i64> = conn
            .hget(&redis_key, START_FIELD)
            .await
            .map_err(store_error)?;

        start.map(|ms| decode_start(&redis_key, ms)).transpose()
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let count: i64 = conn
            .hincr(&redis_key, COUNT_FIELD, 1)
            .await
            .map_err(store_error)?;

        decode_count(&redis_key, count)
    }

    async fn start_window(
        &self,
        key: &str,
        start: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&redis_key)
            .arg(START_FIELD)
            .arg(start.timestamp_millis())
            .arg(COUNT_FIELD)
            .arg(1)
            .ignore();

        let ttl_ms = self.ttl_millis(window);
        if ttl_ms > 0 {
            pipe.cmd("PEXPIRE").arg(&redis_key).arg(ttl_ms).ignore();
        } else {
            pipe.cmd("PERSIST").arg(&redis_key).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await.map_err(store_error)?;
        Ok(())
    }

    async fn record(&self, key: &str) -> Result<Option<WindowRecord>, StoreError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let fields: HashMap<String, i64> =
            conn.hgetall(&redis_key).await.map_err(store_error)?;

        let (Some(&start), Some(&count)) = (fields.get(START_FIELD), fields.get(COUNT_FIELD))
        else {
            return Ok(None);
        };

        Ok(Some(WindowRecord {
            count: decode_count(&redis_key, count)?,
            window_start: decode_start(&redis_key, start)?,
        }))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.make_key(key))
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowRecord, FloodError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let result: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(now.timestamp_millis())
            .arg(i64::try_from(window.as_millis()).unwrap_or(i64::MAX))
            .arg(self.ttl_millis(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(key = %redis_key, error = %e, "Redis flood script failed");
                // A refused connection never reached Redis; anything else may have run.
                if e.is_connection_refusal() {
                    FloodError::StoreUnavailable(store_error(e))
                } else {
                    FloodError::IncrementFailure(store_error(e))
                }
            })?;

        let (Some(&start), Some(&count)) = (result.first(), result.get(1)) else {
            return Err(FloodError::IncrementFailure(StoreError::Corrupt {
                key: redis_key,
                reason: format!("unexpected script reply {result:?}"),
            }));
        };

        Ok(WindowRecord {
            count: decode_count(&redis_key, count).map_err(FloodError::IncrementFailure)?,
            window_start: decode_start(&redis_key, start).map_err(FloodError::IncrementFailure)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flood_core::FloodController;
    use flood_core::domain::FloodPolicy;
    use flood_core::ports::FloodControl;

    async fn get_test_store(prefix: &str) -> Option<RedisCounterStore> {
        get_test_store_with_expiry(prefix, true).await
    }

    async fn get_test_store_with_expiry(
        prefix: &str,
        expire_windows: bool,
    ) -> Option<RedisCounterStore> {
        let config = RedisCounterStoreConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
                fallback_to_memory: false,
            },
            key_prefix: prefix.to_string(),
            expire_windows,
        };

        RedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_primitives() {
        let store = match get_test_store("test_flood_primitives").await {
            Some(s) => s,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let key = "primitives";
        store.remove(key).await.unwrap();
        assert_eq!(store.window_start(key).await.unwrap(), None);

        // Bare increments auto-create the counter at zero.
        assert_eq!(store.increment(key).await.unwrap(), 1);
        assert_eq!(store.increment(key).await.unwrap(), 2);
        assert_eq!(store.record(key).await.unwrap(), None);

        let start = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        store
            .start_window(key, start, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.window_start(key).await.unwrap(), Some(start));
        assert_eq!(
            store.record(key).await.unwrap(),
            Some(WindowRecord::opened_at(start))
        );

        store.remove(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_hit_rolls_over() {
        let store = match get_test_store("test_flood_hit").await {
            Some(s) => s,
            None => return,
        };

        let key = "rollover";
        store.remove(key).await.unwrap();
        let window = Duration::from_secs(5);
        let t0 = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        for expected in 1..=3 {
            let record = store.hit(key, t0, window).await.unwrap();
            assert_eq!(record.count, expected);
            assert_eq!(record.window_start, t0);
        }

        // Past the window: a fresh record, not a fourth count.
        let later = t0 + chrono::Duration::seconds(6);
        let record = store.hit(key, later, window).await.unwrap();
        assert_eq!(record, WindowRecord::opened_at(later));

        store.remove(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_flood_controller() {
        let store = match get_test_store("test_flood_controller").await {
            Some(s) => s,
            None => return,
        };
        store.remove("1").await.unwrap();

        let policy = FloodPolicy::new(Duration::from_secs(1), 2).unwrap();
        let controller = FloodController::new(Arc::new(store), policy);

        assert!(controller.check(1).await.unwrap());
        assert!(controller.check(1).await.unwrap());
        assert!(!controller.check(1).await.unwrap());

        // Wait for the window to pass (and the key to expire)
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(controller.snapshot(1).await.unwrap(), None);
        assert!(controller.check(1).await.unwrap());

        controller.reset(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_rollover_without_expiry_clears_ttl() {
        let expiring = match get_test_store_with_expiry("test_flood_persist", true).await {
            Some(s) => s,
            None => return,
        };
        let persistent = match get_test_store_with_expiry("test_flood_persist", false).await {
            Some(s) => s,
            None => return,
        };

        let key = "persist";
        expiring.remove(key).await.unwrap();
        let window = Duration::from_secs(5);
        let t0 = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        expiring.hit(key, t0, window).await.unwrap();

        // Expiry switched off: the rollover must drop the TTL left by the old window.
        let later = t0 + chrono::Duration::seconds(6);
        let record = persistent.hit(key, later, window).await.unwrap();
        assert_eq!(record, WindowRecord::opened_at(later));

        let mut conn = persistent.conn.clone();
        let ttl: i64 = conn.pttl(persistent.make_key(key)).await.unwrap();
        assert_eq!(ttl, -1);

        persistent.remove(key).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_redis_concurrent_hits_never_lose_counts() {
        let store = match get_test_store("test_flood_concurrent").await {
            Some(s) => Arc::new(s),
            None => return,
        };

        let key = "concurrent";
        store.remove(key).await.unwrap();
        let window = Duration::from_secs(60);
        let t0 = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();

        let before = store.hit(key, t0, window).await.unwrap().count;

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.hit(key, t0, window).await })
            })
            .collect();

        for task in tasks {
            let record = task.await.unwrap().unwrap();
            assert_eq!(record.window_start, t0);
        }

        let after = store.record(key).await.unwrap().unwrap().count;
        assert_eq!(after, before + 64);

        store.remove(key).await.unwrap();
    }
}
