//! Settings for the PostgreSQL cache tier.

use serde::{Deserialize, Serialize};

/// `[postgres]` section. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub url: String,
    pub pool_size: u32,
    /// Bounds both connecting and waiting for a pooled connection.
    pub timeout_ms: u64,
    /// Create `relay_cache_entries` on startup when it is missing.
    pub run_migrations: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/relay".into(),
            pool_size: 4,
            timeout_ms: 2000,
            run_migrations: true,
        }
    }
}

impl PostgresConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    #[must_use]
    pub fn with_run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        let config: PostgresConfig =
            serde_json::from_str(r#"{"url": "postgres://cache@db/relay"}"#).unwrap();
        assert_eq!(config.url, "postgres://cache@db/relay");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.timeout_ms, 2000);
        assert!(config.run_migrations);
    }
}
