//! Prometheus metrics for the relay.
//!
//! This module provides:
//! - Cache metrics per tier (hits, misses, errors)
//! - Refresh queue metrics (jobs by outcome, queue depth)
//! - Gateway and worker metrics (datagrams, drops, task latency)
//! - Origin call metrics

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "relay_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "relay_cache_misses_total";
    pub const CACHE_TIER_ERRORS_TOTAL: &str = "relay_cache_tier_errors_total";
    pub const CACHE_PURGED_TOTAL: &str = "relay_cache_purged_total";

    // Refresh metrics
    pub const REFRESH_JOBS_TOTAL: &str = "relay_refresh_jobs_total";
    pub const REFRESH_QUEUE_SIZE: &str = "relay_refresh_queue_size";

    // Gateway metrics
    pub const GATEWAY_DATAGRAMS_TOTAL: &str = "relay_gateway_datagrams_total";
    pub const GATEWAY_DROPPED_TOTAL: &str = "relay_gateway_dropped_total";

    // Worker metrics
    pub const WORKER_TASKS_TOTAL: &str = "relay_worker_tasks_total";
    pub const WORKER_TASK_DURATION_SECONDS: &str = "relay_worker_task_duration_seconds";

    // Origin metrics
    pub const ORIGIN_CALLS_TOTAL: &str = "relay_origin_calls_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics is served by the control surface
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// Cache Metrics
// =============================================================================

pub fn record_cache_hit(tier: &str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_cache_miss(tier: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_tier_error(tier: &str, operation: &'static str) {
    counter!(
        names::CACHE_TIER_ERRORS_TOTAL,
        "tier" => tier.to_string(),
        "operation" => operation
    )
    .increment(1);
}

pub fn record_cache_purged(count: u64) {
    counter!(names::CACHE_PURGED_TOTAL).increment(count);
}

// =============================================================================
// Refresh Metrics
// =============================================================================

/// Record a finished refresh job (`cache_hit`, `refreshed`, `retried`, `dropped`).
pub fn record_refresh_job(outcome: &'static str) {
    counter!(names::REFRESH_JOBS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_refresh_queue_size(size: usize) {
    gauge!(names::REFRESH_QUEUE_SIZE).set(size as f64);
}

// =============================================================================
// Gateway & Worker Metrics
// =============================================================================

pub fn record_datagram_received() {
    counter!(names::GATEWAY_DATAGRAMS_TOTAL).increment(1);
}

/// Record a dropped datagram (`oversized`, `invalid`, `overflow`).
pub fn record_datagram_dropped(reason: &'static str) {
    counter!(names::GATEWAY_DROPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_worker_task(task_type: &'static str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        names::WORKER_TASKS_TOTAL,
        "type" => task_type,
        "outcome" => outcome
    )
    .increment(1);
    histogram!(names::WORKER_TASK_DURATION_SECONDS, "type" => task_type)
        .record(duration.as_secs_f64());
}

// =============================================================================
// Origin Metrics
// =============================================================================

/// Record an upstream call outcome (`ok` or an `OriginError::kind()`).
pub fn record_origin_call(outcome: &'static str) {
    counter!(names::ORIGIN_CALLS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_hit("memory");
        record_refresh_job("refreshed");
        record_worker_task("ping", true, Duration::from_millis(1));
    }

    #[test]
    fn test_metric_names_are_namespaced() {
        for name in [
            names::CACHE_HITS_TOTAL,
            names::REFRESH_QUEUE_SIZE,
            names::GATEWAY_DROPPED_TOTAL,
            names::WORKER_TASK_DURATION_SECONDS,
            names::ORIGIN_CALLS_TOTAL,
        ] {
            assert!(name.starts_with("relay_"), "{name}");
        }
    }
}
