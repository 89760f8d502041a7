//! Deduplicating priority queue of background refresh jobs.
//!
//! ## Drain
//!
//! `enqueue` merges jobs by key, re-sorts by priority and starts a drain task unless one is
//! already running. The drain pops up to `batch_size` jobs, runs them concurrently and waits
//! for all of them, then pauses `inter_batch_delay` if more work is queued. The single-drain
//! gate is an atomic flag released by a guard on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use relay_core::CacheKey;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::job::{RefreshJob, RefreshReason};
use crate::config::RefreshConfig;
use crate::service::{Refreshed, ResourceService, Source};

/// Number of upcoming jobs reported by [`RefreshQueue::status`].
const STATUS_PREVIEW: usize = 5;

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub decay_step: u32,
    pub min_retry_priority: u32,
    pub dependency_priority: u32,
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
            decay_step: config.decay_step.max(1),
            min_retry_priority: config.min_retry_priority,
            dependency_priority: config.dependency_priority,
        }
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self::from(&RefreshConfig::default())
    }
}

/// What happened to one processed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Still cached; no origin call.
    CacheHit,
    /// Fetched and written back; `dependencies` jobs were enqueued for changed records.
    Refreshed { dependencies: usize },
    /// Failed and re-enqueued at the decayed priority.
    Retried { priority: u32 },
    /// Failed and discarded.
    Dropped,
}

impl JobOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::Refreshed { .. } => "refreshed",
            Self::Retried { .. } => "retried",
            Self::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJobSummary {
    pub resource_id: String,
    pub reason: RefreshReason,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_size: usize,
    pub draining: bool,
    pub next_items: Vec<QueuedJobSummary>,
}

/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct RefreshQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    jobs: Mutex<Vec<RefreshJob>>,
    draining: AtomicBool,
    idle: Notify,
    settings: RefreshSettings,
    service: Arc<ResourceService>,
    cancel: CancellationToken,
}

/// Releases the drain gate when dropped.
struct DrainGate<'a>(&'a AtomicBool);

impl Drop for DrainGate<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshQueue {
    pub fn new(
        service: Arc<ResourceService>,
        settings: RefreshSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(Vec::new()),
                draining: AtomicBool::new(false),
                idle: Notify::new(),
                settings,
                service,
                cancel,
            }),
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    /// Merges `jobs` into the queue and starts a drain if none is running.
    ///
    /// Must be called from within a tokio runtime. Returns the queue size after merging.
    pub fn enqueue(&self, jobs: impl IntoIterator<Item = RefreshJob>) -> usize {
        let size = self.inner.merge(jobs);
        self.inner.trigger_drain();
        size
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn status(&self) -> QueueStatus {
        let jobs = self.inner.jobs.lock();
        QueueStatus {
            queue_size: jobs.len(),
            draining: self.is_draining(),
            next_items: jobs
                .iter()
                .take(STATUS_PREVIEW)
                .map(|job| QueuedJobSummary {
                    resource_id: job.key.to_string(),
                    reason: job.reason,
                    priority: job.priority,
                })
                .collect(),
        }
    }

    /// Resolves once the queue is empty and no drain is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.is_draining() && self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl QueueInner {
    fn merge(&self, incoming: impl IntoIterator<Item = RefreshJob>) -> usize {
        let mut jobs = self.jobs.lock();
        for job in incoming {
            match jobs.iter_mut().find(|queued| queued.key == job.key) {
                Some(queued) => queued.merge(job),
                None => jobs.push(job),
            }
        }
        // Stable: equal priorities keep arrival order
        jobs.sort_by(|a, b| b.priority.cmp(&a.priority));
        crate::metrics::set_refresh_queue_size(jobs.len());
        jobs.len()
    }

    fn pop_batch(&self) -> Vec<RefreshJob> {
        let mut jobs = self.jobs.lock();
        let take = self.settings.batch_size.min(jobs.len());
        let batch: Vec<RefreshJob> = jobs.drain(..take).collect();
        crate::metrics::set_refresh_queue_size(jobs.len());
        batch
    }

    fn has_jobs(&self) -> bool {
        !self.jobs.lock().is_empty()
    }

    fn try_acquire_gate(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn trigger_drain(self: &Arc<Self>) {
        if self.cancel.is_cancelled() || !self.try_acquire_gate() {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain().await });
    }

    /// Runs with the gate held. After releasing it, re-checks for jobs that arrived while the
    /// gate was still held, since their `enqueue` saw a running drain and did not start one.
    async fn drain(self: Arc<Self>) {
        loop {
            {
                let _gate = DrainGate(&self.draining);
                self.run_batches().await;
            }
            self.idle.notify_waiters();

            if self.cancel.is_cancelled() || !self.has_jobs() || !self.try_acquire_gate() {
                return;
            }
        }
    }

    async fn run_batches(self: &Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let batch = self.pop_batch();
            if batch.is_empty() {
                return;
            }
            tracing::debug!(jobs = batch.len(), "draining refresh batch");

            let handles: Vec<_> = batch
                .into_iter()
                .map(|job| {
                    let inner = Arc::clone(self);
                    let key = job.key.clone();
                    (key, tokio::spawn(async move { inner.process(job).await }))
                })
                .collect();

            for (key, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(key = %key, error = %e, "refresh job panicked");
                        JobOutcome::Dropped
                    }
                };
                crate::metrics::record_refresh_job(outcome.label());
            }

            if !self.has_jobs() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.inter_batch_delay) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn process(self: &Arc<Self>, job: RefreshJob) -> JobOutcome {
        let result = match job.reason {
            RefreshReason::DependencyChange => self
                .service
                .force_refresh(&job.key, true)
                .await
                .map(Some),
            RefreshReason::Scheduled | RefreshReason::NewResource => self
                .service
                .get_or_fetch(&job.key)
                .await
                .map(|resolved| match resolved.source {
                    Source::Cache => None,
                    Source::Origin => Some(Refreshed {
                        record: resolved.record,
                        changes: None,
                    }),
                }),
        };

        match result {
            Ok(None) => {
                tracing::debug!(key = %job.key, reason = %job.reason, "refresh job: cache hit");
                JobOutcome::CacheHit
            }
            Ok(Some(refreshed)) => {
                let dependencies = if refreshed.changed() {
                    self.enqueue_dependencies(&refreshed.record.dependencies)
                } else {
                    0
                };
                tracing::debug!(key = %job.key, reason = %job.reason, dependencies, "refresh job: refreshed");
                JobOutcome::Refreshed { dependencies }
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(key = %job.key, error = %e, "refresh job dropped: not retryable");
                JobOutcome::Dropped
            }
            Err(e) if job.priority > self.settings.min_retry_priority => {
                let priority = job.priority.saturating_sub(self.settings.decay_step);
                tracing::info!(
                    key = %job.key,
                    error = %e,
                    from = job.priority,
                    to = priority,
                    "refresh job failed, re-enqueued"
                );
                self.merge([RefreshJob::new(job.key, job.reason, priority)]);
                JobOutcome::Retried { priority }
            }
            Err(e) => {
                tracing::warn!(key = %job.key, error = %e, priority = job.priority, "refresh job dropped");
                JobOutcome::Dropped
            }
        }
    }

    fn enqueue_dependencies(self: &Arc<Self>, dependencies: &[CacheKey]) -> usize {
        if dependencies.is_empty() {
            return 0;
        }
        let jobs = dependencies.iter().map(|key| {
            RefreshJob::new(
                key.clone(),
                RefreshReason::DependencyChange,
                self.settings.dependency_priority,
            )
        });
        self.merge(jobs);
        self.trigger_drain();
        dependencies.len()
    }
}
