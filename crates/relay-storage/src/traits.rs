//! The contract every cache tier backend implements.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Payload, StoreLookup};

/// Uniform `get/set/delete` over one concrete backend.
///
/// Implementations must be thread-safe (`Send + Sync`). They do not enforce deadlines; the
/// tier chain wraps every call in its own timeout.
///
/// # Example
///
/// ```ignore
/// use relay_storage::{StoreAdapter, StoreError};
///
/// async fn warm(store: &dyn StoreAdapter, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
///     store.set(key, std::sync::Arc::new(bytes), std::time::Duration::from_secs(60)).await
/// }
/// ```
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Short backend label used in logs (`memory`, `redis`, `postgres`).
    fn backend(&self) -> &'static str;

    /// Reads a key. Expired entries are reported as [`StoreLookup::Expired`] and removed.
    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError>;

    /// Writes a key with its own TTL, replacing any previous value.
    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), StoreError>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Default implementation is a no-op (for backends like Redis with native TTL).
    async fn purge_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }

    /// Number of entries the backend currently holds for this tier.
    async fn entry_count(&self) -> Result<u64, StoreError>;
}
