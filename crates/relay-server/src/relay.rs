//! The orchestrator: owns the tier chain, refresh queue, worker pool and gateway.
//!
//! A `Relay` is built once, shared behind an `Arc`, started with [`Relay::start`] and
//! stopped with [`Relay::stop`]. Background loops (tracked-resource sweep, tier purge,
//! gateway) share one cancellation token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use relay_core::{CacheKey, OriginFetcher, PassthroughNormalizer};
use relay_db_postgres::PostgresStore;
use relay_storage::{MemoryStore, StoreAdapter};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{RedisStore, Tier, TierChain, TierStatsSnapshot, TtlPolicy};
use crate::config::{AppConfig, CacheConfig, GatewayConfig, TierKind};
use crate::gateway::{GatewayStatsSnapshot, TransportGateway};
use crate::origin::HttpOrigin;
use crate::refresh::{QueueStatus, RefreshJob, RefreshQueue, RefreshSettings, TrackedResources};
use crate::service::ResourceService;
use crate::workers::{WorkerContext, WorkerPool};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("origin client: {0}")]
    Origin(#[from] relay_core::OriginError),

    #[error("gateway bind failed: {0}")]
    Gateway(#[from] std::io::Error),

    #[error("relay already started")]
    AlreadyStarted,
}

/// Runtime knobs that are not part of the tier chain or origin.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub refresh: RefreshSettings,
    pub pool_size: usize,
    pub task_timeout: Duration,
    pub sweep_interval: Duration,
    pub sweep_priority: u32,
    pub purge_interval: Duration,
    /// `None` disables the datagram gateway.
    pub gateway: Option<GatewayConfig>,
}

impl From<&AppConfig> for RelayOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            refresh: RefreshSettings::from(&config.refresh),
            pool_size: config.workers.pool_size,
            task_timeout: config.workers.task_timeout(),
            sweep_interval: Duration::from_secs(config.refresh.sweep_interval_secs),
            sweep_priority: config.refresh.sweep_priority,
            purge_interval: Duration::from_secs(config.cache.purge_interval_secs),
            gateway: config.gateway.enabled.then(|| config.gateway.clone()),
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounters {
    pub queue_size: usize,
    pub draining: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub worker_count: usize,
    pub tasks_processed: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub tiers: Vec<TierStatsSnapshot>,
    pub queue: QueueCounters,
    pub pool: PoolStats,
    pub tracked_resources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayStatsSnapshot>,
}

pub struct Relay {
    service: Arc<ResourceService>,
    queue: RefreshQueue,
    pool: Arc<WorkerPool>,
    tracked: Arc<TrackedResources>,
    options: RelayOptions,
    gateway: OnceLock<Arc<TransportGateway>>,
    cancel: CancellationToken,
    started: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Relay {
    /// Assembles a relay from an already-built tier chain and origin.
    pub fn new(chain: TierChain, origin: Arc<dyn OriginFetcher>, options: RelayOptions) -> Self {
        let cancel = CancellationToken::new();
        let service = Arc::new(ResourceService::new(chain, origin));
        let queue = RefreshQueue::new(
            Arc::clone(&service),
            options.refresh.clone(),
            cancel.child_token(),
        );
        let tracked = Arc::new(TrackedResources::new());
        let context = Arc::new(WorkerContext {
            service: Arc::clone(&service),
            queue: queue.clone(),
            tracked: Arc::clone(&tracked),
            task_timeout: options.task_timeout,
        });
        let pool = Arc::new(WorkerPool::new(options.pool_size, context));

        Self {
            service,
            queue,
            pool,
            tracked,
            options,
            gateway: OnceLock::new(),
            cancel,
            started: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Builds tiers, origin client and pools from configuration.
    ///
    /// Redis and Postgres tiers that cannot be reached are left out of the chain; if no tier
    /// remains, a single in-process tier is used.
    pub async fn from_config(config: &AppConfig) -> Result<Self, RelayError> {
        let chain = build_chain(config).await;
        let origin = HttpOrigin::new(&config.origin, Arc::new(PassthroughNormalizer))?;
        Ok(Self::new(chain, Arc::new(origin), RelayOptions::from(config)))
    }

    /// Spawns the background loops and, when enabled, binds the gateway.
    pub async fn start(&self) -> Result<(), RelayError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(RelayError::AlreadyStarted);
        }

        let mut handles = Vec::new();
        if let Some(config) = &self.options.gateway {
            let gateway = match TransportGateway::bind(config, Arc::clone(&self.pool)).await {
                Ok(gateway) => Arc::new(gateway),
                Err(e) => {
                    self.started.store(false, Ordering::Release);
                    return Err(e.into());
                }
            };
            handles.extend(gateway.spawn(self.cancel.child_token()));
            let _ = self.gateway.set(gateway);
        }

        handles.push(tokio::spawn(sweep_loop(
            self.queue.clone(),
            Arc::clone(&self.tracked),
            self.options.sweep_interval,
            self.options.sweep_priority,
            self.cancel.child_token(),
        )));
        handles.push(tokio::spawn(purge_loop(
            self.service.chain().clone(),
            self.options.purge_interval,
            self.cancel.child_token(),
        )));

        self.handles.lock().extend(handles);
        tracing::info!(
            tiers = self.service.chain().tiers().len(),
            workers = self.pool.size(),
            gateway = self.gateway.get().is_some(),
            "relay started"
        );
        Ok(())
    }

    /// Cancels every background loop and the refresh drain, then waits for the loops to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("relay stopped");
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            tiers: self.service.chain().stats().await,
            queue: QueueCounters {
                queue_size: self.queue.len(),
                draining: self.queue.is_draining(),
            },
            pool: PoolStats {
                worker_count: self.pool.size(),
                tasks_processed: self
                    .pool
                    .workers()
                    .iter()
                    .map(|w| w.tasks_processed())
                    .collect(),
            },
            tracked_resources: self.tracked.len(),
            gateway: self.gateway.get().map(|g| g.stats()),
        }
    }

    /// Adds refresh jobs; returns the queue size after merging.
    pub fn enqueue(&self, jobs: Vec<RefreshJob>) -> usize {
        self.queue.enqueue(jobs)
    }

    pub fn status(&self) -> QueueStatus {
        self.queue.status()
    }

    pub async fn invalidate(&self, key: &CacheKey) -> usize {
        self.service.invalidate(key).await
    }

    pub fn reset_stats(&self) {
        self.service.chain().reset_stats();
    }

    pub fn service(&self) -> &Arc<ResourceService> {
        &self.service
    }

    pub fn queue(&self) -> &RefreshQueue {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn tracked(&self) -> &Arc<TrackedResources> {
        &self.tracked
    }

    pub fn gateway(&self) -> Option<&Arc<TransportGateway>> {
        self.gateway.get()
    }
}

async fn build_chain(config: &AppConfig) -> TierChain {
    let cache = &config.cache;
    let mut tiers = Vec::with_capacity(cache.tiers.len());

    for tier in &cache.tiers {
        let store: Arc<dyn StoreAdapter> = match tier.kind {
            TierKind::Memory => Arc::new(MemoryStore::new(cache.memory_max_entries)),
            TierKind::Redis => match RedisStore::connect(&config.redis).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(tier = %tier.name, error = %e, "Redis unavailable, tier skipped");
                    continue;
                }
            },
            TierKind::Postgres => match PostgresStore::new(&config.postgres).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(tier = %tier.name, error = %e, "Postgres unavailable, tier skipped");
                    continue;
                }
            },
        };
        tracing::info!(
            tier = %tier.name,
            backend = store.backend(),
            ttl_secs = tier.ttl_secs,
            "cache tier ready"
        );
        tiers.push(Tier::new(tier.name.clone(), store, tier.ttl(), tier.timeout()));
    }

    if tiers.is_empty() {
        tracing::warn!("no cache tier available, falling back to in-process cache");
        let fallback = CacheConfig::default();
        for tier in &fallback.tiers {
            tiers.push(Tier::new(
                tier.name.clone(),
                Arc::new(MemoryStore::new(cache.memory_max_entries)),
                tier.ttl(),
                tier.timeout(),
            ));
        }
    }

    TierChain::new(tiers, ttl_policy(cache))
}

fn ttl_policy(cache: &CacheConfig) -> TtlPolicy {
    let mut policy = TtlPolicy::new();
    for (resource_type, per_tier) in &cache.resource_ttl {
        for (tier, secs) in per_tier {
            policy = policy.with_resource_ttl(*resource_type, tier.clone(), Duration::from_secs(*secs));
        }
    }
    policy
}

async fn sweep_loop(
    queue: RefreshQueue,
    tracked: Arc<TrackedResources>,
    every: Duration,
    priority: u32,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    // First tick fires immediately; nothing is tracked yet at startup
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let jobs = tracked.sweep_jobs(priority);
        if jobs.is_empty() {
            continue;
        }
        let count = jobs.len();
        let size = queue.enqueue(jobs);
        tracing::debug!(jobs = count, queue_size = size, "scheduled refresh sweep");
    }
}

async fn purge_loop(chain: TierChain, every: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let purged = chain.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries purged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierConfig;
    use relay_core::ResourceType;
    use std::collections::HashMap;

    #[test]
    fn test_ttl_policy_from_config() {
        let mut per_tier = HashMap::new();
        per_tier.insert("memory".to_string(), 5);
        let mut cache = CacheConfig::default();
        cache.resource_ttl.insert(ResourceType::Market, per_tier);

        let policy = ttl_policy(&cache);
        let default = Duration::from_secs(60);
        assert_eq!(
            policy.resolve("memory", default, ResourceType::Market, None),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.resolve("memory", default, ResourceType::News, None),
            default
        );
    }

    #[tokio::test]
    async fn test_unreachable_tiers_fall_back_to_memory() {
        let mut config = AppConfig::default();
        config.redis.url = "redis://127.0.0.1:1".to_string();
        config.redis.timeout_ms = 200;
        config.cache.tiers = vec![TierConfig {
            name: "shared".to_string(),
            kind: TierKind::Redis,
            ttl_secs: 600,
            timeout_ms: 100,
        }];

        let chain = build_chain(&config).await;
        assert_eq!(chain.tiers().len(), 1);
        assert_eq!(chain.stats().await[0].backend, "memory");
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut config = AppConfig::default();
        config.gateway.enabled = false;
        let relay = Relay::from_config(&config).await.unwrap();

        relay.start().await.unwrap();
        assert!(matches!(relay.start().await, Err(RelayError::AlreadyStarted)));
        relay.stop().await;
    }
}
