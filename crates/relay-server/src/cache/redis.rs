//! Redis tier adapter.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use relay_db_postgres::mask_password;
use relay_storage::{Payload, StoreAdapter, StoreError, StoreLookup};
use std::sync::Arc;

use crate::config::RedisConfig;

const SCAN_BATCH: usize = 500;

/// Shared Redis tier. Expiry is native (`SET EX`), so reads never observe expired keys.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    /// Builds a pool from config and checks one connection.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        tracing::info!(url = %mask_password(&config.url), "Connecting to Redis");

        let timeout = Some(Duration::from_millis(config.timeout_ms));
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size.max(1));
        pool_config.timeouts.wait = timeout;
        pool_config.timeouts.create = timeout;
        pool_config.timeouts.recycle = timeout;

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::connection_error(e.to_string()))?;

        pool.get()
            .await
            .map_err(|e| StoreError::connection_error(e.to_string()))?;

        tracing::info!("Connected to Redis successfully");
        Ok(Self::new(pool, config.key_prefix.clone()))
    }

    /// Check if Redis is reachable (for health checks).
    pub async fn is_available(&self) -> bool {
        self.pool.get().await.is_ok()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Counts this tier's keys with `SCAN MATCH <prefix>*`. Keys changing mid-scan may be
    /// counted twice or missed.
    async fn count_keys(&self) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut count: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::command_error(e.to_string()))?;
            count += keys.len() as u64;
            if next == 0 {
                return Ok(count);
            }
            cursor = next;
        }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::connection_error(e.to_string()))
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn
            .get(self.prefixed(key))
            .await
            .map_err(|e| StoreError::command_error(e.to_string()))?;
        Ok(match value {
            Some(data) => StoreLookup::Hit(Arc::new(data)),
            None => StoreLookup::Miss,
        })
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        // SET EX rejects 0
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.prefixed(key), value.as_slice(), ttl_secs)
            .await
            .map_err(|e| StoreError::command_error(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.prefixed(key))
            .await
            .map_err(|e| StoreError::command_error(e.to_string()))
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        self.count_keys().await
    }
}
