use super::lua_scripts::INCREMENT_WINDOW_SCRIPT;
use super::store::CounterStore;
use crate::config::RedisConfig;
use crate::error::{RateLimiterError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, error, info};
use url::Url;

/// Redis-backed distributed counter store
///
/// Counting relies on Redis' atomic `INCR`; blocks are separate keys with a
/// native TTL so they expire without cleanup.
pub struct RedisStore {
    /// Redis connection manager, `None` once closed
    connection: RwLock<Option<ConnectionManager>>,
    /// Prefix shared by all keys written by this store
    key_prefix: String,
    /// Upper bound for every Redis round-trip
    command_timeout: Duration,
    increment_script: Script,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with `PING`
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let url = connection_url(config)?;
        let command_timeout = config.timeout();

        let client = redis::Client::open(url.as_str())?;
        let mut connection = timeout(command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                RateLimiterError::StoreUnavailable(format!(
                    "connecting to {}:{} timed out after {:?}",
                    config.host, config.port, command_timeout
                ))
            })??;

        timeout(
            command_timeout,
            redis::cmd("PING").query_async::<_, ()>(&mut connection),
        )
        .await
        .map_err(|_| RateLimiterError::StoreUnavailable("PING timed out".to_string()))??;

        info!(host = %config.host, port = config.port, "Connected to Redis");

        Ok(Self {
            connection: RwLock::new(Some(connection)),
            key_prefix: config.key_prefix.clone(),
            command_timeout,
            increment_script: Script::new(INCREMENT_WINDOW_SCRIPT),
        })
    }

    /// Key holding the request counter
    pub fn count_key(&self, key: &str) -> String {
        format!("{}count:{}", self.key_prefix, key)
    }

    /// Key holding the block marker
    pub fn block_key(&self, key: &str) -> String {
        format!("{}blocked:{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| RateLimiterError::StoreUnavailable("store is closed".to_string()))
    }

    /// Run a Redis command, bounded by the configured timeout
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(op, error = %e, "Redis command failed");
                Err(e.into())
            }
            Err(_) => {
                error!(op, timeout_ms = self.command_timeout.as_millis() as u64, "Redis command timed out");
                Err(RateLimiterError::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    op, self.command_timeout
                )))
            }
        }
    }
}

/// Build the connection URL, escaping the password
fn connection_url(config: &RedisConfig) -> Result<Url> {
    let mut url = Url::parse(&format!("redis://{}:{}/{}", config.host, config.port, config.db))
        .map_err(|e| RateLimiterError::Config(format!("Invalid Redis address: {}", e)))?;

    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        url.set_password(Some(password))
            .map_err(|_| RateLimiterError::Config("Invalid Redis password".to_string()))?;
    }

    Ok(url)
}

/// Milliseconds for `PX`/`PEXPIRE`, clamped to what Redis accepts
fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, i64::MAX as u64)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get_count(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let count: Option<u64> = self.bounded("GET", conn.get(self.count_key(key))).await?;
        Ok(count.unwrap_or(0))
    }

    async fn increment_count(&self, key: &str, window: Duration) -> Result<u64> {
        let mut conn = self.connection().await?;
        let count_key = self.count_key(key);

        let count: u64 = self
            .bounded(
                "INCR",
                self.increment_script
                    .key(&count_key)
                    .arg(as_millis(window))
                    .invoke_async::<_, u64>(&mut conn),
            )
            .await?;

        debug!(key = %count_key, count, "Incremented counter");
        Ok(count)
    }

    async fn is_blocked(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        self.bounded("EXISTS", conn.exists(self.block_key(key))).await
    }

    async fn block(&self, key: &str, duration: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let block_key = self.block_key(key);
        let count_key = self.count_key(key);

        // MULTI/EXEC so no increment can land between the SET and the DEL
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(&block_key)
            .arg(1)
            .arg("PX")
            .arg(as_millis(duration))
            .ignore()
            .cmd("DEL")
            .arg(&count_key)
            .ignore();

        self.bounded("BLOCK", pipe.query_async::<_, ()>(&mut conn))
            .await?;

        debug!(key = %block_key, duration_ms = as_millis(duration), "Blocked key");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.connection.write().await.take().is_some() {
            info!("Closed Redis connection");
        }
        Ok(())
    }
}
