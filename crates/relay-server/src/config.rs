use relay_core::ResourceType;
use relay_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP control surface
    #[serde(default)]
    pub server: ServerConfig,
    /// UDP datagram gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Tier list and TTL policy
    #[serde(default)]
    pub cache: CacheConfig,
    /// Redis connection used by `redis` tiers
    #[serde(default)]
    pub redis: RedisConfig,
    /// PostgreSQL connection used by `postgres` tiers
    #[serde(default)]
    pub postgres: PostgresConfig,
    /// Upstream API client
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Gateway validations
        if self.gateway.enabled && self.gateway.bind.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "gateway.bind must be a socket address, got '{}'",
                self.gateway.bind
            ));
        }
        if self.gateway.max_datagram_bytes == 0 {
            return Err("gateway.max_datagram_bytes must be > 0".into());
        }
        if self.gateway.queue_capacity == 0 {
            return Err("gateway.queue_capacity must be > 0".into());
        }
        if self.gateway.tick_ms == 0 {
            return Err("gateway.tick_ms must be > 0".into());
        }
        // Worker validations
        if self.workers.pool_size == 0 {
            return Err("workers.pool_size must be > 0".into());
        }
        if self.workers.task_timeout_ms == 0 {
            return Err("workers.task_timeout_ms must be > 0".into());
        }
        // Refresh validations
        if self.refresh.batch_size == 0 {
            return Err("refresh.batch_size must be > 0".into());
        }
        if self.refresh.decay_step == 0 {
            return Err("refresh.decay_step must be > 0".into());
        }
        if self.refresh.sweep_interval_secs == 0 {
            return Err("refresh.sweep_interval_secs must be > 0".into());
        }
        // Cache validations
        if self.cache.tiers.is_empty() {
            return Err("cache.tiers must list at least one tier".into());
        }
        let mut names = HashSet::new();
        for tier in &self.cache.tiers {
            if tier.name.is_empty() {
                return Err("cache.tiers[].name must not be empty".into());
            }
            if !names.insert(tier.name.as_str()) {
                return Err(format!("cache.tiers has duplicate name '{}'", tier.name));
            }
            if tier.ttl_secs == 0 || tier.timeout_ms == 0 {
                return Err(format!(
                    "cache tier '{}' needs ttl_secs > 0 and timeout_ms > 0",
                    tier.name
                ));
            }
        }
        for (resource_type, tiers) in &self.cache.resource_ttl {
            for (tier, ttl) in tiers {
                if !names.contains(tier.as_str()) {
                    return Err(format!(
                        "cache.resource_ttl.{resource_type} names unknown tier '{tier}'"
                    ));
                }
                if *ttl == 0 {
                    return Err(format!(
                        "cache.resource_ttl.{resource_type}.{tier} must be > 0"
                    ));
                }
            }
        }
        // Origin validations
        if self.origin.base_url.is_empty() {
            return Err("origin.base_url must not be empty".into());
        }
        if self.origin.calls_per_minute == 0 {
            return Err("origin.calls_per_minute must be > 0".into());
        }
        if self.origin.timeout_ms == 0 {
            return Err("origin.timeout_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    256 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,
    /// UDP bind address
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    /// Datagrams larger than this are dropped before parsing
    #[serde(default = "default_max_datagram_bytes")]
    pub max_datagram_bytes: usize,
    /// Inbound queue bound; overflow drops the newest datagram
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Dispatch loop period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_gateway_enabled() -> bool {
    true
}
fn default_gateway_bind() -> String {
    "0.0.0.0:7171".into()
}
fn default_max_datagram_bytes() -> usize {
    8192
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_tick_ms() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            bind: default_gateway_bind(),
            max_datagram_bytes: default_max_datagram_bytes(),
            queue_capacity: default_queue_capacity(),
            tick_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Deadline for one task; exceeding it is a failure
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
}

fn default_pool_size() -> usize {
    4
}
fn default_task_timeout_ms() -> u64 {
    10_000
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

impl WorkersConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Jobs popped per drain batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches while the queue is non-empty
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    /// Priority lost on each failed attempt
    #[serde(default = "default_decay_step")]
    pub decay_step: u32,
    /// Failed jobs at or below this priority are dropped instead of retried
    #[serde(default = "default_min_retry_priority")]
    pub min_retry_priority: u32,
    /// Period of the scheduled sweep over tracked resources
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_priority")]
    pub sweep_priority: u32,
    /// Priority of jobs enqueued for dependencies of a changed record
    #[serde(default = "default_dependency_priority")]
    pub dependency_priority: u32,
}

fn default_batch_size() -> usize {
    5
}
fn default_inter_batch_delay_ms() -> u64 {
    1000
}
fn default_decay_step() -> u32 {
    1
}
fn default_min_retry_priority() -> u32 {
    1
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_sweep_priority() -> u32 {
    1
}
fn default_dependency_priority() -> u32 {
    2
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            decay_step: default_decay_step(),
            min_retry_priority: default_min_retry_priority(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_priority: default_sweep_priority(),
            dependency_priority: default_dependency_priority(),
        }
    }
}

/// Backend behind one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub kind: TierKind,
    /// Default TTL for writes to this tier
    pub ttl_secs: u64,
    /// Deadline for one call to this tier
    #[serde(default = "default_tier_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_tier_timeout_ms() -> u64 {
    500
}

impl TierConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tiers ordered fastest first
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,

    /// Per-resource-type TTL overrides in seconds, keyed by tier name
    #[serde(default)]
    pub resource_ttl: HashMap<ResourceType, HashMap<String, u64>>,

    /// Period of the expired-entry sweep over all tiers
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Entry limit of each memory tier
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,
}

fn default_tiers() -> Vec<TierConfig> {
    vec![TierConfig {
        name: "memory".into(),
        kind: TierKind::Memory,
        ttl_secs: 60,
        timeout_ms: 50,
    }]
}

fn default_purge_interval_secs() -> u64 {
    60
}

fn default_memory_max_entries() -> usize {
    10000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            resource_ttl: HashMap::new(),
            purge_interval_secs: default_purge_interval_secs(),
            memory_max_entries: default_memory_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prepended to every storage key
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_key_prefix() -> String {
    "relay:".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_origin_base_url")]
    pub base_url: String,
    /// Upstream call budget
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    #[serde(default = "default_origin_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_origin_base_url() -> String {
    "http://localhost:9090/api".into()
}
fn default_calls_per_minute() -> u32 {
    60
}
fn default_origin_timeout_ms() -> u64 {
    10_000
}
fn default_user_agent() -> String {
    concat!("relay/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: default_origin_base_url(),
            calls_per_minute: default_calls_per_minute(),
            timeout_ms: default_origin_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default config file looked up when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., RELAY__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.gateway.max_datagram_bytes, 8192);
        assert_eq!(cfg.gateway.queue_capacity, 1000);
        assert_eq!(cfg.workers.pool_size, 4);
        assert_eq!(cfg.workers.task_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.refresh.batch_size, 5);
        assert_eq!(cfg.refresh.inter_batch_delay_ms, 1000);
        assert_eq!(cfg.refresh.decay_step, 1);
        assert_eq!(cfg.refresh.min_retry_priority, 1);
        assert_eq!(cfg.origin.calls_per_minute, 60);
    }

    #[test]
    fn test_duplicate_tier_names_rejected() {
        let mut cfg = AppConfig::default();
        cfg.cache.tiers.push(cfg.cache.tiers[0].clone());
        assert!(cfg.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_resource_ttl_must_name_known_tier() {
        let mut cfg = AppConfig::default();
        cfg.cache
            .resource_ttl
            .entry(ResourceType::News)
            .or_default()
            .insert("redis".into(), 30);
        assert!(cfg.validate().unwrap_err().contains("unknown tier"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[refresh]
batch_size = 3
decay_step = 2

[[cache.tiers]]
name = "memory"
kind = "memory"
ttl_secs = 30

[[cache.tiers]]
name = "shared"
kind = "redis"
ttl_secs = 600
timeout_ms = 250

[cache.resource_ttl.news]
shared = 45
"#
        )
        .unwrap();

        let cfg = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(cfg.refresh.batch_size, 3);
        assert_eq!(cfg.refresh.decay_step, 2);
        assert_eq!(cfg.cache.tiers.len(), 2);
        assert_eq!(cfg.cache.tiers[1].kind, TierKind::Redis);
        assert_eq!(cfg.cache.tiers[0].timeout_ms, 500);
        assert_eq!(cfg.cache.resource_ttl[&ResourceType::News]["shared"], 45);
    }
}
