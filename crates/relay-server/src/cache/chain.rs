//! Ordered read-through/write-through tier chain.
//!
//! ```text
//! get(K) → tier 1 → tier 2 → … → tier N → not found
//!            ↑ backfill (async, each tier's own TTL) on a hit at tier i
//! ```
//!
//! A tier that errors or exceeds its deadline counts as a miss on reads and a no-op on writes.
//! Tier failures are logged and counted; they never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use relay_core::CacheKey;
use relay_storage::{Payload, StoreAdapter, StoreLookup};

use super::stats::{TierStats, TierStatsSnapshot};
use super::ttl::{TtlOverrides, TtlPolicy};

/// One cache tier: a store plus its default TTL, call deadline and counters.
#[derive(Clone)]
pub struct Tier {
    name: String,
    store: Arc<dyn StoreAdapter>,
    ttl: Duration,
    timeout: Duration,
    stats: Arc<TierStats>,
}

impl Tier {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StoreAdapter>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            ttl,
            timeout,
            stats: Arc::new(TierStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> &TierStats {
        &self.stats
    }

    async fn snapshot(&self) -> TierStatsSnapshot {
        let entries = match tokio::time::timeout(self.timeout, self.store.entry_count()).await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                tracing::debug!(tier = %self.name, error = %e, "tier entry count failed");
                None
            }
            Err(_) => {
                tracing::debug!(tier = %self.name, "tier entry count timed out");
                None
            }
        };
        TierStatsSnapshot {
            name: self.name.clone(),
            backend: self.store.backend(),
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            entries,
            evictions: self.stats.evictions(),
            errors: self.stats.errors(),
        }
    }

    async fn lookup(&self, key: &str) -> Option<Payload> {
        match tokio::time::timeout(self.timeout, self.store.get(key)).await {
            Ok(Ok(StoreLookup::Hit(value))) => {
                self.stats.record_hit();
                crate::metrics::record_cache_hit(&self.name);
                tracing::debug!(tier = %self.name, key = %key, "cache hit");
                Some(value)
            }
            Ok(Ok(StoreLookup::Miss)) => {
                self.record_miss();
                None
            }
            Ok(Ok(StoreLookup::Expired)) => {
                self.stats.record_evictions(1);
                self.record_miss();
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(tier = %self.name, key = %key, error = %e, category = %e.category(), "tier GET error");
                self.record_failure("get");
                None
            }
            Err(_) => {
                tracing::warn!(tier = %self.name, key = %key, timeout_ms = self.timeout.as_millis() as u64, "tier GET timed out");
                self.record_failure("get");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: Payload, ttl: Duration) -> bool {
        match tokio::time::timeout(self.timeout, self.store.set(key, value, ttl)).await {
            Ok(Ok(())) => {
                tracing::debug!(tier = %self.name, key = %key, ttl_secs = ttl.as_secs(), "cache set");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(tier = %self.name, key = %key, error = %e, category = %e.category(), "tier SET error");
                self.record_failure("set");
                false
            }
            Err(_) => {
                tracing::warn!(tier = %self.name, key = %key, "tier SET timed out");
                self.record_failure("set");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.store.delete(key)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(tier = %self.name, key = %key, error = %e, "tier DEL error");
                self.record_failure("delete");
                false
            }
            Err(_) => {
                tracing::warn!(tier = %self.name, key = %key, "tier DEL timed out");
                self.record_failure("delete");
                false
            }
        }
    }

    async fn purge(&self) -> u64 {
        match tokio::time::timeout(self.timeout, self.store.purge_expired()).await {
            Ok(Ok(removed)) => {
                self.stats.record_evictions(removed);
                removed
            }
            Ok(Err(e)) => {
                tracing::warn!(tier = %self.name, error = %e, "tier purge error");
                self.record_failure("purge");
                0
            }
            Err(_) => {
                tracing::warn!(tier = %self.name, "tier purge timed out");
                self.record_failure("purge");
                0
            }
        }
    }

    fn record_miss(&self) {
        self.stats.record_miss();
        crate::metrics::record_cache_miss(&self.name);
    }

    fn record_failure(&self, op: &'static str) {
        self.stats.record_error();
        if op == "get" {
            self.record_miss();
        }
        crate::metrics::record_tier_error(&self.name, op);
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("backend", &self.store.backend())
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tiers ordered fastest first. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TierChain {
    tiers: Arc<[Tier]>,
    policy: Arc<TtlPolicy>,
}

impl TierChain {
    pub fn new(tiers: Vec<Tier>, policy: TtlPolicy) -> Self {
        Self {
            tiers: tiers.into(),
            policy: Arc::new(policy),
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Probes tiers in order. A hit at tier `i` backfills tiers `0..i` in the background.
    pub async fn get(&self, key: &CacheKey) -> Option<Payload> {
        let storage_key = key.storage_key();

        for (index, tier) in self.tiers.iter().enumerate() {
            if let Some(value) = tier.lookup(&storage_key).await {
                if index > 0 {
                    self.spawn_backfill(key, &storage_key, index, value.clone());
                }
                return Some(value);
            }
        }

        tracing::debug!(key = %key, "cache miss (all tiers)");
        None
    }

    fn spawn_backfill(&self, key: &CacheKey, storage_key: &str, hit_index: usize, value: Payload) {
        let chain = self.clone();
        let resource_type = key.resource_type();
        let storage_key = storage_key.to_string();

        tokio::spawn(async move {
            let writes = chain.tiers[..hit_index].iter().map(|tier| {
                let ttl = chain
                    .policy
                    .resolve(tier.name(), tier.ttl, resource_type, None);
                tier.write(&storage_key, value.clone(), ttl)
            });
            join_all(writes).await;
            tracing::debug!(key = %storage_key, tiers = hit_index, "cache backfilled");
        });
    }

    /// Writes every tier independently. Returns how many tiers accepted the write.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: Payload,
        overrides: Option<&TtlOverrides>,
    ) -> usize {
        let storage_key = key.storage_key();
        let resource_type = key.resource_type();

        let writes = self.tiers.iter().map(|tier| {
            let ttl = self
                .policy
                .resolve(tier.name(), tier.ttl, resource_type, overrides);
            tier.write(&storage_key, value.clone(), ttl)
        });

        join_all(writes).await.into_iter().filter(|ok| *ok).count()
    }

    /// Best-effort removal from every tier. Returns how many tiers confirmed it.
    pub async fn delete(&self, key: &CacheKey) -> usize {
        let storage_key = key.storage_key();
        let removed = join_all(self.tiers.iter().map(|tier| tier.remove(&storage_key)))
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        tracing::debug!(key = %key, tiers = removed, "cache invalidated");
        removed
    }

    pub async fn invalidate(&self, key: &CacheKey) -> usize {
        self.delete(key).await
    }

    /// Sweeps expired entries from every tier; removals count as evictions.
    pub async fn purge_expired(&self) -> u64 {
        join_all(self.tiers.iter().map(Tier::purge))
            .await
            .into_iter()
            .sum()
    }

    /// Counters plus a live entry count per tier. A tier that cannot count reports `None`.
    pub async fn stats(&self) -> Vec<TierStatsSnapshot> {
        join_all(self.tiers.iter().map(Tier::snapshot)).await
    }

    pub fn reset_stats(&self) {
        for tier in self.tiers.iter() {
            tier.stats.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ResourceType;
    use relay_storage::MemoryStore;

    fn memory_tier(name: &str, ttl_secs: u64) -> (Tier, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let tier = Tier::new(
            name,
            store.clone(),
            Duration::from_secs(ttl_secs),
            Duration::from_millis(200),
        );
        (tier, store)
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new(ResourceType::Character, id).unwrap()
    }

    #[tokio::test]
    async fn test_all_miss_returns_none() {
        let (a, _) = memory_tier("memory", 60);
        let (b, _) = memory_tier("shared", 600);
        let chain = TierChain::new(vec![a, b], TtlPolicy::new());

        assert!(chain.get(&key("1")).await.is_none());
        let stats = chain.stats().await;
        assert_eq!(stats[0].misses, 1);
        assert_eq!(stats[1].misses, 1);
    }

    #[tokio::test]
    async fn test_set_writes_every_tier_and_delete_clears_them() {
        let (a, store_a) = memory_tier("memory", 60);
        let (b, store_b) = memory_tier("shared", 600);
        let chain = TierChain::new(vec![a, b], TtlPolicy::new());
        let k = key("7");

        assert_eq!(chain.set(&k, Arc::new(vec![1, 2]), None).await, 2);
        assert_eq!(store_a.len(), 1);
        assert_eq!(store_b.len(), 1);
        let entries: Vec<_> = chain.stats().await.iter().map(|s| s.entries).collect();
        assert_eq!(entries, vec![Some(1), Some(1)]);

        assert_eq!(chain.delete(&k).await, 2);
        assert!(store_a.is_empty());
        assert!(store_b.is_empty());
    }

    #[tokio::test]
    async fn test_expired_read_counts_eviction() {
        let (a, store_a) = memory_tier("memory", 60);
        let chain = TierChain::new(vec![a], TtlPolicy::new());
        let k = key("9");

        store_a
            .set(&k.storage_key(), Arc::new(vec![1]), Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert!(chain.get(&k).await.is_none());
        let stats = &chain.stats().await[0];
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (a, _) = memory_tier("memory", 60);
        let chain = TierChain::new(vec![a], TtlPolicy::new());
        chain.get(&key("1")).await;
        chain.reset_stats();
        assert_eq!(chain.stats().await[0].misses, 0);
    }
}
