//! Per-key request coalescing.
//!
//! The first caller for a key spawns the work; every concurrent caller for the same key
//! awaits the same shared handle. The work runs to completion even if every caller stops
//! waiting, and the entry is removed when it finishes or panics, so a later call always
//! starts fresh work.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use relay_core::CacheKey;

type Flight<T> = Shared<BoxFuture<'static, Result<T, FlightAborted>>>;

/// The shared work panicked or was cancelled; every caller waiting on it receives this.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("in-flight work for {0} did not complete")]
pub struct FlightAborted(pub String);

pub struct SingleFlight<T: Clone> {
    inflight: Arc<DashMap<CacheKey, Flight<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Runs `work` unless a flight for `key` is already running, then awaits the shared result.
    pub async fn run<F, Fut>(&self, key: &CacheKey, work: F) -> Result<T, FlightAborted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::trace!(key = %key, "joining in-flight fetch");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let work = work();
                let release = Release {
                    inflight: Arc::clone(&self.inflight),
                    key: key.clone(),
                };
                let handle = tokio::spawn(async move {
                    let _release = release;
                    work.await
                });
                let label = key.to_string();
                let flight = async move {
                    handle.await.map_err(|e| {
                        tracing::error!(key = %label, error = %e, "in-flight work aborted");
                        FlightAborted(label)
                    })
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Number of keys with work in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

struct Release<T: Clone> {
    inflight: Arc<DashMap<CacheKey, Flight<T>>>,
    key: CacheKey,
}

impl<T: Clone> Drop for Release<T> {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}
