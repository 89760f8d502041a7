//! Fixed-size pool of logical workers with round-robin selection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;

use super::task::{InboundTask, TaskError, TaskResponse, TaskType};
use crate::refresh::{RefreshJob, RefreshQueue, RefreshReason, TrackedResources};
use crate::service::ResourceService;

/// Everything a worker needs to run a task. Shared by all workers in a pool.
pub struct WorkerContext {
    pub service: Arc<ResourceService>,
    pub queue: RefreshQueue,
    pub tracked: Arc<TrackedResources>,
    pub task_timeout: Duration,
}

impl WorkerContext {
    async fn execute(&self, worker_id: usize, task: &InboundTask) -> Result<Value, TaskError> {
        match task.task_type {
            TaskType::ResourceDetail => self.resource_detail(task).await,
            TaskType::ForceRefresh => self.force_refresh(task).await,
            TaskType::CacheStatus => Ok(json!({
                "tiers": self.service.chain().stats().await,
                "queue": self.queue.status(),
                "tracked": self.tracked.len(),
            })),
            TaskType::Ping => Ok(json!({ "pong": true, "worker": worker_id })),
        }
    }

    async fn resource_detail(&self, task: &InboundTask) -> Result<Value, TaskError> {
        let key = task.resource_key()?;
        let resolved = self.service.get_or_fetch(&key).await?;
        if self.tracked.track(&key) {
            tracing::debug!(key = %key, "tracking resource for scheduled refresh");
        }

        let record = &resolved.record;
        Ok(json!({
            "resourceId": key.to_string(),
            "source": resolved.source.as_str(),
            "fetchedAt": record.fetched_at.format(&Rfc3339).unwrap_or_default(),
            "dependencies": record.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "record": record.data,
        }))
    }

    async fn force_refresh(&self, task: &InboundTask) -> Result<Value, TaskError> {
        let key = task.resource_key()?;
        let refreshed = self.service.force_refresh(&key, false).await?;
        self.tracked.track(&key);

        let mut queued = 0;
        if refreshed.changed() && !refreshed.record.dependencies.is_empty() {
            let priority = self.queue.settings().dependency_priority;
            let jobs: Vec<RefreshJob> = refreshed
                .record
                .dependencies
                .iter()
                .map(|dep| RefreshJob::new(dep.clone(), RefreshReason::DependencyChange, priority))
                .collect();
            queued = jobs.len();
            self.queue.enqueue(jobs);
        }

        let changed: Vec<&str> = refreshed
            .changes
            .as_ref()
            .map(|c| c.sections().collect())
            .unwrap_or_default();
        Ok(json!({
            "resourceId": key.to_string(),
            "previouslyCached": refreshed.changes.is_some(),
            "changedSections": changed,
            "dependenciesQueued": queued,
            "record": refreshed.record.data,
        }))
    }
}

/// One logical worker. Tasks run on the tokio runtime; the worker only labels and bounds them.
pub struct Worker {
    id: usize,
    context: Arc<WorkerContext>,
    processed: AtomicU64,
}

impl Worker {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Tasks handed to this worker so far.
    pub fn tasks_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Runs `task` under the task deadline. Failures, timeouts and panics all become a
    /// failed [`TaskResponse`] carrying the task id.
    pub async fn process(&self, task: InboundTask) -> TaskResponse {
        self.processed.fetch_add(1, Ordering::Relaxed);

        let task_id = task.id.clone();
        let task_type = task.task_type;
        let received_at = task.received_at;
        let timeout = self.context.task_timeout;

        let context = Arc::clone(&self.context);
        let worker_id = self.id;
        let handle = tokio::spawn(async move { context.execute(worker_id, &task).await });
        let abort = handle.abort_handle();

        let result = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(worker = self.id, task_id = %task_id, error = %join_error, "task panicked");
                Err(TaskError::Aborted(join_error.to_string()))
            }
            Err(_) => {
                abort.abort();
                Err(TaskError::Timeout(timeout))
            }
        };

        if let Err(e) = &result {
            tracing::warn!(worker = self.id, task_id = %task_id, task_type = task_type.as_str(), error = %e, "task failed");
        }

        let response = TaskResponse::from_result(task_id, received_at, result);
        crate::metrics::record_worker_task(
            task_type.as_str(),
            response.success,
            received_at.elapsed(),
        );
        response
    }
}

pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(size: usize, context: Arc<WorkerContext>) -> Self {
        let workers = (0..size.max(1))
            .map(|id| {
                Arc::new(Worker {
                    id,
                    context: Arc::clone(&context),
                    processed: AtomicU64::new(0),
                })
            })
            .collect();
        Self {
            workers,
            next: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Round robin; never blocks.
    pub fn next_worker(&self) -> Arc<Worker> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        Arc::clone(&self.workers[index])
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }
}
