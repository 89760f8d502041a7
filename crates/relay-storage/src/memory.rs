//! In-process store backed by DashMap.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::traits::StoreAdapter;
use crate::types::{CacheEntry, Payload, StoreLookup};

/// Default maximum number of entries to prevent unbounded memory growth.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Local in-memory store with lazy TTL expiration.
///
/// Expired entries are dropped when read and by [`StoreAdapter::purge_expired`]. When the
/// store is full, expired entries are purged first; if it is still full, new keys are
/// refused (overwrites of existing keys are always accepted).
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_expired(&self) -> u64 {
        let now = OffsetDateTime::now_utc();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(StoreLookup::Hit(entry.value.clone()));
            }
            // Entry expired, remove it
            drop(entry);
            self.entries.remove(key);
            return Ok(StoreLookup::Expired);
        }
        Ok(StoreLookup::Miss)
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), StoreError> {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            let removed = self.remove_expired();
            if removed > 0 {
                tracing::debug!(removed, "memory store purged expired entries to make room");
            }
            if self.entries.len() >= self.max_entries {
                return Err(StoreError::Capacity {
                    max_entries: self.max_entries,
                });
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(self.remove_expired())
    }

    async fn entry_count(&self) -> Result<u64, StoreError> {
        Ok(self.entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload(bytes: &[u8]) -> Payload {
        Arc::new(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::default();
        store
            .set("character:1", payload(b"ayla"), Duration::from_secs(60))
            .await
            .unwrap();

        let hit = store.get("character:1").await.unwrap().into_payload();
        assert_eq!(hit, Some(payload(b"ayla")));
        assert_eq!(store.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_miss() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.get("nonexistent").await.unwrap(),
            StoreLookup::Miss
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_read() {
        let store = MemoryStore::default();
        store
            .set("news:latest", payload(b"v"), Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            store.get("news:latest").await.unwrap(),
            StoreLookup::Expired
        ));
        assert!(store.is_empty());
        assert!(matches!(
            store.get("news:latest").await.unwrap(),
            StoreLookup::Miss
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::default();
        store
            .set("guild:9", payload(b"v"), Duration::from_secs(60))
            .await
            .unwrap();
        store.delete("guild:9").await.unwrap();
        store.delete("guild:9").await.unwrap();
        assert!(store.get("guild:9").await.unwrap().into_payload().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::default();
        for i in 0..3 {
            store
                .set(&format!("item:{i}"), payload(b"v"), Duration::from_millis(10))
                .await
                .unwrap();
        }
        store
            .set("item:keep", payload(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_refuses_new_keys_but_allows_overwrite() {
        let store = MemoryStore::new(2);
        let ttl = Duration::from_secs(60);
        store.set("a:1", payload(b"1"), ttl).await.unwrap();
        store.set("a:2", payload(b"2"), ttl).await.unwrap();

        let err = store.set("a:3", payload(b"3"), ttl).await.unwrap_err();
        assert!(matches!(err, StoreError::Capacity { max_entries: 2 }));

        store.set("a:2", payload(b"22"), ttl).await.unwrap();
        assert_eq!(
            store.get("a:2").await.unwrap().into_payload(),
            Some(payload(b"22"))
        );
    }

    #[tokio::test]
    async fn test_capacity_purges_expired_first() {
        let store = MemoryStore::new(1);
        store
            .set("a:1", payload(b"1"), Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        store
            .set("a:2", payload(b"2"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }
}
