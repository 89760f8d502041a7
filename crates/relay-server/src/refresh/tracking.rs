//! Resources served to clients, revisited by the scheduled sweep.

use dashmap::DashSet;
use relay_core::CacheKey;

use super::job::{RefreshJob, RefreshReason};

#[derive(Debug, Default)]
pub struct TrackedResources {
    keys: DashSet<CacheKey>,
}

impl TrackedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a key is seen.
    pub fn track(&self, key: &CacheKey) -> bool {
        self.keys.insert(key.clone())
    }

    pub fn untrack(&self, key: &CacheKey) -> bool {
        self.keys.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// One `scheduled` job per tracked key.
    pub fn sweep_jobs(&self, priority: u32) -> Vec<RefreshJob> {
        self.keys
            .iter()
            .map(|key| RefreshJob::new(key.clone(), RefreshReason::Scheduled, priority))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ResourceType;

    #[test]
    fn test_sweep_jobs_cover_tracked_keys_once() {
        let tracked = TrackedResources::new();
        let a = CacheKey::new(ResourceType::Character, "1").unwrap();
        let b = CacheKey::new(ResourceType::Guild, "2").unwrap();

        assert!(tracked.track(&a));
        assert!(!tracked.track(&a));
        assert!(tracked.track(&b));

        let jobs = tracked.sweep_jobs(1);
        assert_eq!(jobs.len(), 2);
        assert!(jobs
            .iter()
            .all(|j| j.reason == RefreshReason::Scheduled && j.priority == 1));

        assert!(tracked.untrack(&a));
        assert_eq!(tracked.len(), 1);
    }
}
