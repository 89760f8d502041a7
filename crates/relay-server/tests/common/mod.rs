//! Shared fakes for relay-server integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{
    CacheKey, Normalizer, NormalizedRecord, OriginError, OriginFetcher, PassthroughNormalizer,
};
use relay_server::cache::{Tier, TierChain, TtlPolicy};
use relay_server::refresh::RefreshSettings;
use relay_server::{Relay, RelayOptions};
use relay_storage::{MemoryStore, Payload, StoreAdapter, StoreError, StoreLookup};
use serde_json::{Value, json};

pub fn key(reference: &str) -> CacheKey {
    reference.parse().expect("valid cache key")
}

/// Origin that serves configurable bodies and counts calls per key.
#[derive(Default)]
pub struct CountingOrigin {
    calls: Mutex<HashMap<CacheKey, usize>>,
    bodies: Mutex<HashMap<CacheKey, Value>>,
    failures: Mutex<HashMap<CacheKey, OriginError>>,
    delay: Duration,
}

impl CountingOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn set_body(&self, key: &CacheKey, body: Value) {
        self.bodies.lock().insert(key.clone(), body);
    }

    /// Every later fetch of `key` fails with `error`.
    pub fn fail_with(&self, key: &CacheKey, error: OriginError) {
        self.failures.lock().insert(key.clone(), error);
    }

    pub fn calls(&self, key: &CacheKey) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl OriginFetcher for CountingOrigin {
    async fn fetch(&self, key: &CacheKey) -> Result<NormalizedRecord, OriginError> {
        *self.calls.lock().entry(key.clone()).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.failures.lock().get(key).cloned() {
            return Err(error);
        }
        let body = self
            .bodies
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| json!({ "id": key.id(), "name": format!("resource {}", key.id()) }));
        PassthroughNormalizer.normalize(key, body)
    }
}

/// Origin that always fails with the same error.
pub struct FailingOrigin {
    error: OriginError,
    calls: AtomicUsize,
}

impl FailingOrigin {
    pub fn new(error: OriginError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for FailingOrigin {
    async fn fetch(&self, _key: &CacheKey) -> Result<NormalizedRecord, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Store whose every call fails.
pub struct FailingStore;

#[async_trait]
impl StoreAdapter for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<StoreLookup, StoreError> {
        Err(StoreError::connection_error("store is down"))
    }

    async fn set(&self, _key: &str, _value: Payload, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::connection_error("store is down"))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::connection_error("store is down"))
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        Err(StoreError::connection_error("store is down"))
    }
}

/// Store that answers every call after `delay`.
pub struct SlowStore {
    pub delay: Duration,
}

#[async_trait]
impl StoreAdapter for SlowStore {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn get(&self, _key: &str) -> Result<StoreLookup, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(StoreLookup::Miss)
    }

    async fn set(&self, _key: &str, _value: Payload, _ttl: Duration) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }
}

/// Memory store whose reads take the snapshot first and then wait `delay` before answering.
pub struct LaggyStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl StoreAdapter for LaggyStore {
    fn backend(&self) -> &'static str {
        "laggy"
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        let lookup = self.inner.get(key).await;
        tokio::time::sleep(self.delay).await;
        lookup
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        self.inner.entry_count().await
    }
}

/// Store that panics on every read.
pub struct PanickingStore;

#[async_trait]
impl StoreAdapter for PanickingStore {
    fn backend(&self) -> &'static str {
        "panicking"
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        panic!("corrupt shard for {key}")
    }

    async fn set(&self, _key: &str, _value: Payload, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

pub fn chain_of(name: &str, store: Arc<dyn StoreAdapter>) -> TierChain {
    let tier = Tier::new(name, store, Duration::from_secs(60), Duration::from_secs(2));
    TierChain::new(vec![tier], TtlPolicy::new())
}

pub fn memory_tier(name: &str, ttl: Duration) -> (Tier, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let tier = Tier::new(name, store.clone(), ttl, Duration::from_millis(200));
    (tier, store)
}

pub fn memory_chain() -> TierChain {
    let (tier, _) = memory_tier("memory", Duration::from_secs(60));
    TierChain::new(vec![tier], TtlPolicy::new())
}

/// Options for tests: no gateway, short batch delay, four workers.
pub fn test_options() -> RelayOptions {
    RelayOptions {
        refresh: RefreshSettings {
            batch_size: 5,
            inter_batch_delay: Duration::from_millis(10),
            decay_step: 1,
            min_retry_priority: 1,
            dependency_priority: 2,
        },
        pool_size: 4,
        task_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_secs(300),
        sweep_priority: 1,
        purge_interval: Duration::from_secs(60),
        gateway: None,
    }
}

pub fn relay_with(origin: Arc<dyn OriginFetcher>) -> Relay {
    Relay::new(memory_chain(), origin, test_options())
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
