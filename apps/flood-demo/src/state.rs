//! Counter store selection.

use std::sync::Arc;
use std::time::Duration;

use flood_core::ports::CounterStore;
use flood_infra::InMemoryCounterStore;

use crate::config::StoreKind;

#[cfg(feature = "redis")]
use flood_infra::{RedisCounterStore, RedisCounterStoreConfig};

/// Build the configured counter store, falling back to memory when allowed.
/// In-memory stores get a background sweeper running every `sweep_every`.
pub async fn build_store(
    kind: StoreKind,
    sweep_every: Duration,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    match kind {
        StoreKind::Memory => {
            tracing::info!("Using in-memory counter store");
            Ok(memory_store(sweep_every))
        }
        #[cfg(feature = "redis")]
        StoreKind::Redis => {
            let config = RedisCounterStoreConfig::from_env();
            let fallback = config.redis.fallback_to_memory;
            match RedisCounterStore::new(config).await {
                Ok(store) => Ok(Arc::new(store)),
                Err(e) if fallback => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory fallback.",
                        e
                    );
                    Ok(memory_store(sweep_every))
                }
                Err(e) => Err(e.into()),
            }
        }
        #[cfg(not(feature = "redis"))]
        StoreKind::Redis => {
            tracing::warn!("Built without redis feature - using in-memory counter store");
            Ok(memory_store(sweep_every))
        }
    }
}

fn memory_store(sweep_every: Duration) -> Arc<dyn CounterStore> {
    let store = Arc::new(InMemoryCounterStore::new());
    store.spawn_sweeper(sweep_every);
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts() {
        let store = build_store(StoreKind::Memory, Duration::from_secs(60))
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let window = Duration::from_secs(5);
        assert_eq!(store.hit("1", now, window).await.unwrap().count, 1);
        assert_eq!(store.hit("1", now, window).await.unwrap().count, 2);
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_kind_without_feature_uses_memory() {
        let store = build_store(StoreKind::Redis, Duration::from_secs(60))
            .await
            .unwrap();
        let record = store
            .hit("1", chrono::Utc::now(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(record.count, 1);
    }
}
