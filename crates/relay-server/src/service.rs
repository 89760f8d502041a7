//! Resource resolution shared by the worker pool and the refresh queue.
//!
//! Reads go through the tier chain; misses and forced refreshes go to the origin behind a
//! per-key single-flight gate, and the fetched record is written back to every tier.

use std::sync::Arc;

use relay_core::{CacheKey, ChangeSet, NormalizedRecord, OriginError, OriginFetcher};

use crate::cache::{TierChain, decode_record, encode_record};
use crate::refresh::singleflight::SingleFlight;


/// Where a served record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Origin,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Origin => "origin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub record: Arc<NormalizedRecord>,
    pub source: Source,
}

/// Result of refetching a resource from the origin.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub record: Arc<NormalizedRecord>,
    /// Sections that differ from the previously cached value; `None` when nothing was cached.
    pub changes: Option<ChangeSet>,
}

impl Refreshed {
    pub fn changed(&self) -> bool {
        self.changes.as_ref().is_some_and(|c| !c.is_empty())
    }
}

pub struct ResourceService {
    chain: TierChain,
    origin: Arc<dyn OriginFetcher>,
    flights: SingleFlight<Result<Resolved, OriginError>>,
}

impl ResourceService {
    pub fn new(chain: TierChain, origin: Arc<dyn OriginFetcher>) -> Self {
        Self {
            chain,
            origin,
            flights: SingleFlight::new(),
        }
    }

    pub fn chain(&self) -> &TierChain {
        &self.chain
    }

    /// Number of origin fetches currently in progress.
    pub fn fetches_in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Cached record for `key`, if any tier holds a decodable value.
    pub async fn cached(&self, key: &CacheKey) -> Option<NormalizedRecord> {
        read_cached(&self.chain, key).await
    }

    /// Cache first; on a miss, fetch once per key and write the result to every tier.
    pub async fn get_or_fetch(&self, key: &CacheKey) -> Result<Resolved, OriginError> {
        if let Some(record) = self.cached(key).await {
            return Ok(Resolved {
                record: Arc::new(record),
                source: Source::Cache,
            });
        }
        self.coalesced(key, true).await
    }

    /// Bypasses the cache, refetches, writes back and diffs against the previous value.
    ///
    /// With `invalidate_first`, the cached value is removed before the fetch so a failed
    /// fetch leaves nothing stale behind.
    pub async fn force_refresh(
        &self,
        key: &CacheKey,
        invalidate_first: bool,
    ) -> Result<Refreshed, OriginError> {
        let previous = self.cached(key).await;
        if invalidate_first {
            self.chain.invalidate(key).await;
        }

        let record = self.fetch(key).await?;
        let changes = previous.map(|old| ChangeSet::between(&old.data, &record.data));

        if let Some(changes) = &changes
            && !changes.is_empty()
        {
            tracing::info!(
                key = %key,
                sections = ?changes.sections().collect::<Vec<_>>(),
                "resource changed upstream"
            );
        }

        Ok(Refreshed { record, changes })
    }

    pub async fn invalidate(&self, key: &CacheKey) -> usize {
        self.chain.invalidate(key).await
    }

    /// Fetches from the origin (once per key across concurrent callers) and caches the result.
    async fn fetch(&self, key: &CacheKey) -> Result<Arc<NormalizedRecord>, OriginError> {
        self.coalesced(key, false).await.map(|resolved| resolved.record)
    }

    async fn coalesced(&self, key: &CacheKey, recheck: bool) -> Result<Resolved, OriginError> {
        let origin = Arc::clone(&self.origin);
        let chain = self.chain.clone();
        let owned_key = key.clone();

        self.flights
            .run(key, move || async move {
                // An earlier flight may have written the value after the caller's miss.
                if recheck && let Some(record) = read_cached(&chain, &owned_key).await {
                    return Ok(Resolved {
                        record: Arc::new(record),
                        source: Source::Cache,
                    });
                }

                let record = Arc::new(origin.fetch(&owned_key).await?);
                match encode_record(&record) {
                    Ok(bytes) => {
                        let written = chain.set(&owned_key, bytes, None).await;
                        tracing::debug!(key = %owned_key, tiers = written, "fetched record cached");
                    }
                    Err(e) => {
                        tracing::warn!(key = %owned_key, error = %e, "fetched record not cached");
                    }
                }
                Ok(Resolved {
                    record,
                    source: Source::Origin,
                })
            })
            .await
            .unwrap_or_else(|aborted| Err(OriginError::upstream(aborted.to_string())))
    }
}

async fn read_cached(chain: &TierChain, key: &CacheKey) -> Option<NormalizedRecord> {
    let bytes = chain.get(key).await?;
    match decode_record(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "dropping undecodable cache entry");
            chain.delete(key).await;
            None
        }
    }
}
