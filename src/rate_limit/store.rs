use super::memory::MemoryStore;
use super::redis::RedisStore;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Keyed counters and block markers with expiry.
///
/// Both backends must behave identically: a counter past its window reads
/// as zero, and `block` clears the counter for the same key in the same
/// atomic step.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current count for `key`, or 0 if absent or expired
    async fn get_count(&self, key: &str) -> Result<u64>;

    /// Atomically add one to `key` and return the new value.
    ///
    /// An absent or expired counter starts a new window of `window`.
    async fn increment_count(&self, key: &str, window: Duration) -> Result<u64>;

    /// Whether `key` has an unexpired block
    async fn is_blocked(&self, key: &str) -> Result<bool>;

    /// Block `key` for `duration` and clear its counter
    async fn block(&self, key: &str, duration: Duration) -> Result<()>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Build the store selected by the configuration
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn CounterStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!(
                sweep_interval_secs = config.sweep_interval_secs,
                "Using in-memory counter store"
            );
            let store = if config.sweep_interval_secs > 0 {
                MemoryStore::with_sweep(Duration::from_secs(config.sweep_interval_secs))
            } else {
                MemoryStore::new()
            };
            Ok(Arc::new(store))
        }
        StorageBackend::Redis => {
            info!(
                host = %config.redis.host,
                port = config.redis.port,
                db = config.redis.db,
                "Using Redis counter store"
            );
            let store = RedisStore::connect(&config.redis).await?;
            Ok(Arc::new(store))
        }
    }
}
