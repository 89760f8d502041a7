//! `StoreAdapter` over a single PostgreSQL table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_storage::{Payload, StoreAdapter, StoreError, StoreLookup};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;
use crate::migrations;
use crate::pool::create_pool;

const SELECT_ENTRY: &str =
    "SELECT value, expires_at <= now() AS expired FROM relay_cache_entries WHERE key = $1";

const UPSERT_ENTRY: &str = "INSERT INTO relay_cache_entries (key, value, inserted_at, expires_at) \
     VALUES ($1, $2, now(), now() + make_interval(secs => $3)) \
     ON CONFLICT (key) DO UPDATE SET \
     value = EXCLUDED.value, inserted_at = EXCLUDED.inserted_at, expires_at = EXCLUDED.expires_at";

const DELETE_ENTRY: &str = "DELETE FROM relay_cache_entries WHERE key = $1";

const DELETE_EXPIRED_ENTRY: &str =
    "DELETE FROM relay_cache_entries WHERE key = $1 AND expires_at <= now()";

const PURGE_EXPIRED: &str = "DELETE FROM relay_cache_entries WHERE expires_at <= now()";

const COUNT_LIVE: &str = "SELECT count(*) FROM relay_cache_entries WHERE expires_at > now()";

/// Relational cache tier. Expiry is evaluated by the database clock.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects a pool and, when configured, applies the cache table migrations.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Wraps an existing pool. The cache table must already exist.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, key: &str) -> Result<StoreLookup> {
        let row: Option<(Vec<u8>, bool)> = query_as(SELECT_ENTRY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(StoreLookup::Miss),
            Some((value, false)) => Ok(StoreLookup::Hit(Arc::new(value))),
            Some((_, true)) => {
                // Guarded on expiry so a concurrent fresh write is not removed.
                query(DELETE_EXPIRED_ENTRY)
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                Ok(StoreLookup::Expired)
            }
        }
    }

    async fn upsert(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        query(UPSERT_ENTRY)
            .bind(key)
            .bind(value)
            .bind(ttl.as_secs_f64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        query(DELETE_ENTRY).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn count_live(&self) -> Result<u64> {
        let (count,): (i64,) = query_as(COUNT_LIVE).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn remove_expired(&self) -> Result<u64> {
        let result = query(PURGE_EXPIRED).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StoreAdapter for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> std::result::Result<StoreLookup, StoreError> {
        self.fetch(key).await.map_err(StoreError::from)
    }

    async fn set(
        &self,
        key: &str,
        value: Payload,
        ttl: Duration,
    ) -> std::result::Result<(), StoreError> {
        self.upsert(key, value.as_slice(), ttl)
            .await
            .map_err(StoreError::from)
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.remove(key).await.map_err(StoreError::from)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> std::result::Result<u64, StoreError> {
        let removed = self.remove_expired().await.map_err(StoreError::from)?;
        debug!(removed, "purged expired postgres cache rows");
        Ok(removed)
    }

    async fn entry_count(&self) -> std::result::Result<u64, StoreError> {
        self.count_live().await.map_err(StoreError::from)
    }
}
