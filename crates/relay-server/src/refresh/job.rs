//! Refresh jobs and their merge rule.

use relay_core::CacheKey;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Why a resource is being refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshReason {
    /// Periodic sweep over tracked resources.
    Scheduled,
    /// First sighting of a resource.
    NewResource,
    /// A record that links to this one changed upstream.
    DependencyChange,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::NewResource => "new-resource",
            Self::DependencyChange => "dependency-change",
        }
    }
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshJob {
    #[serde(rename = "resourceId")]
    pub key: CacheKey,
    pub reason: RefreshReason,
    pub priority: u32,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub enqueued_at: OffsetDateTime,
}

impl RefreshJob {
    pub fn new(key: CacheKey, reason: RefreshReason, priority: u32) -> Self {
        Self {
            key,
            reason,
            priority,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }

    /// Folds a duplicate for the same key into this job: the higher priority wins, and the
    /// reason and timestamp come from whichever job was enqueued more recently.
    pub fn merge(&mut self, other: RefreshJob) {
        self.priority = self.priority.max(other.priority);
        if other.enqueued_at >= self.enqueued_at {
            self.reason = other.reason;
            self.enqueued_at = other.enqueued_at;
        }
    }
}
