//! Per-tier TTL resolution.
//!
//! Precedence: explicit per-call [`TtlOverrides`] > per-resource-type override from config >
//! the tier's default TTL.

use std::collections::HashMap;
use std::time::Duration;

use relay_core::ResourceType;

/// Per-call TTLs keyed by tier name. Tiers not named keep their policy TTL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlOverrides {
    by_tier: HashMap<String, Duration>,
}

impl TtlOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tier(mut self, tier: impl Into<String>, ttl: Duration) -> Self {
        self.by_tier.insert(tier.into(), ttl);
        self
    }

    pub fn get(&self, tier: &str) -> Option<Duration> {
        self.by_tier.get(tier).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tier.is_empty()
    }
}

/// Resource-type TTLs from configuration, keyed by resource type then tier name.
#[derive(Debug, Clone, Default)]
pub struct TtlPolicy {
    by_resource: HashMap<ResourceType, HashMap<String, Duration>>,
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resource_ttl(
        mut self,
        resource_type: ResourceType,
        tier: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.by_resource
            .entry(resource_type)
            .or_default()
            .insert(tier.into(), ttl);
        self
    }

    /// TTL for one write to `tier`.
    pub fn resolve(
        &self,
        tier: &str,
        tier_default: Duration,
        resource_type: ResourceType,
        overrides: Option<&TtlOverrides>,
    ) -> Duration {
        if let Some(ttl) = overrides.and_then(|o| o.get(tier)) {
            return ttl;
        }
        self.by_resource
            .get(&resource_type)
            .and_then(|tiers| tiers.get(tier))
            .copied()
            .unwrap_or(tier_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_secs(60);

    #[test]
    fn test_tier_default_applies_without_overrides() {
        let policy = TtlPolicy::new();
        assert_eq!(
            policy.resolve("memory", DEFAULT, ResourceType::Character, None),
            DEFAULT
        );
    }

    #[test]
    fn test_resource_override_only_for_named_tier() {
        let policy =
            TtlPolicy::new().with_resource_ttl(ResourceType::News, "redis", Duration::from_secs(30));

        assert_eq!(
            policy.resolve("redis", DEFAULT, ResourceType::News, None),
            Duration::from_secs(30)
        );
        assert_eq!(
            policy.resolve("memory", DEFAULT, ResourceType::News, None),
            DEFAULT
        );
        assert_eq!(
            policy.resolve("redis", DEFAULT, ResourceType::Guild, None),
            DEFAULT
        );
    }

    #[test]
    fn test_call_override_wins() {
        let policy =
            TtlPolicy::new().with_resource_ttl(ResourceType::News, "redis", Duration::from_secs(30));
        let overrides = TtlOverrides::new().with_tier("redis", Duration::from_secs(5));

        assert_eq!(
            policy.resolve("redis", DEFAULT, ResourceType::News, Some(&overrides)),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.resolve("memory", DEFAULT, ResourceType::News, Some(&overrides)),
            DEFAULT
        );
    }
}
