//! Adapters - Implementations of port interfaces.
//!
//! - `clock` - System and manually advanced clocks
//! - `store` - Shared key-value store (in-memory, Redis, resilience decorator)
//! - `throttle` - Shadow throttle persistence (in-memory, PostgreSQL)
//! - `http` - axum admission middleware

pub mod clock;
pub mod http;
pub mod store;
pub mod throttle;

pub use clock::{ManualClock, SystemClock};
pub use store::{InMemoryKeyValueStore, RedisKeyValueStore, ResilientStore};
pub use throttle::{InMemoryThrottleRepository, PostgresThrottleRepository};

use std::sync::Arc;

use crate::config::{RedisConfig, StoreBackend, StoreConfig};
use crate::ports::{Clock, KeyValueStore, StoreError};

/// Builds the configured store, wrapped in the timeout/retry decorator.
pub async fn build_store(
    store: &StoreConfig,
    redis: &RedisConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let inner: Arc<dyn KeyValueStore> = match store.backend {
        StoreBackend::Memory => Arc::new(InMemoryKeyValueStore::with_clock(clock)),
        StoreBackend::Redis => {
            let connected = tokio::time::timeout(redis.timeout(), RedisKeyValueStore::connect(&redis.url))
                .await
                .map_err(|_| StoreError::Timeout(redis.timeout()))??;
            Arc::new(connected)
        }
    };
    tracing::info!(backend = ?store.backend, timeout_ms = store.timeout_ms, "key-value store ready");
    Ok(Arc::new(ResilientStore::new(inner, store.timeout(), store.retries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_builds_without_network() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = build_store(&config, &RedisConfig::default(), Arc::new(ManualClock::fixed()))
            .await
            .unwrap();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.ping().await.is_ok());
    }
}
