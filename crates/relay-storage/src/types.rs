//! Types shared by store adapters.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

/// Opaque cached payload. `Arc` keeps hits and backfills cheap to clone.
pub type Payload = Arc<Vec<u8>>;

/// One cached value in one tier.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Payload,
    pub inserted_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl CacheEntry {
    /// Creates an entry that expires `ttl` from now.
    pub fn new(key: impl Into<String>, value: Payload, ttl: Duration) -> Self {
        let inserted_at = OffsetDateTime::now_utc();
        Self {
            key: key.into(),
            value,
            inserted_at,
            expires_at: inserted_at + ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of a single `get` against one store.
#[derive(Debug, Clone)]
pub enum StoreLookup {
    Hit(Payload),
    Miss,
    /// The key existed but its TTL had passed; the store dropped it during this read.
    Expired,
}

impl StoreLookup {
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            StoreLookup::Hit(payload) => Some(payload),
            StoreLookup::Miss | StoreLookup::Expired => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry() {
        let entry = CacheEntry::new("k", Arc::new(vec![1]), Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert!(entry.is_expired_at(entry.expires_at));
        assert_eq!(entry.expires_at - entry.inserted_at, time::Duration::seconds(60));
    }

    #[test]
    fn test_lookup_payload() {
        assert!(StoreLookup::Hit(Arc::new(vec![7])).into_payload().is_some());
        assert!(StoreLookup::Miss.into_payload().is_none());
        assert!(StoreLookup::Expired.into_payload().is_none());
    }
}
