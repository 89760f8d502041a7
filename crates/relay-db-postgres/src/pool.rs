//! Pool for the cache table.
//!
//! A cache tier must fail fast: the pool opens no idle connections up front, waits at most
//! `timeout_ms` for a connection, and connects once at build time so an unreachable
//! database is reported before the tier joins the chain.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    if config.pool_size == 0 {
        return Err(PostgresError::config("pool_size must be greater than 0"));
    }

    let timeout = Duration::from_millis(config.timeout_ms.max(1));
    let pool = PoolOptions::<Postgres>::new()
        .max_connections(config.pool_size)
        .min_connections(0)
        .acquire_timeout(timeout)
        .connect(&config.url)
        .await?;

    info!(pool_size = config.pool_size, "postgres cache pool ready");
    Ok(pool)
}

/// Replaces the password in a connection URL's userinfo with `****`.
pub fn mask_password(url: &str) -> String {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let Some(at) = url[authority_start..].find('@').map(|i| authority_start + i) else {
        return url.to_string();
    };
    match url[authority_start..at].find(':') {
        Some(colon) => {
            let colon = authority_start + colon;
            format!("{}:****{}", &url[..colon], &url[at..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://cache:hunter2@db:5432/relay"),
            "postgres://cache:****@db:5432/relay"
        );
        assert_eq!(
            mask_password("redis://:hunter2@cache:6379/0"),
            "redis://:****@cache:6379/0"
        );
        assert_eq!(mask_password("redis://cache:6379"), "redis://cache:6379");
        assert_eq!(
            mask_password("postgres://cache@db/relay"),
            "postgres://cache@db/relay"
        );
    }

    #[tokio::test]
    async fn test_zero_pool_size_is_rejected() {
        let config = PostgresConfig::default().with_pool_size(0);
        let err = create_pool(&config).await.unwrap_err();
        assert!(matches!(err, PostgresError::Config { .. }));
    }
}
