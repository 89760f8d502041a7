//! Task model shared by the gateway and the worker pool.

use std::time::{Duration, Instant};

use relay_core::{CacheKey, CoreError, OriginError, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Operations a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Serve a resource, cache first.
    ResourceDetail,
    /// Refetch a resource regardless of the cache.
    ForceRefresh,
    /// Tier and queue statistics.
    CacheStatus,
    /// Liveness probe.
    Ping,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceDetail => "resource_detail",
            Self::ForceRefresh => "force_refresh",
            Self::CacheStatus => "cache_status",
            Self::Ping => "ping",
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone)]
pub struct InboundTask {
    pub id: String,
    pub task_type: TaskType,
    pub payload: Value,
    pub received_at: Instant,
}

impl InboundTask {
    pub fn new(id: impl Into<String>, task_type: TaskType, payload: Value) -> Self {
        Self {
            id: id.into(),
            task_type,
            payload,
            received_at: Instant::now(),
        }
    }

    /// Resource key named by the payload, either `{"resourceId": "type:id[?query]"}` or
    /// `{"resourceType": "type", "id": "id", "query": "a=1"}`.
    pub fn resource_key(&self) -> Result<CacheKey, TaskError> {
        if let Some(reference) = self.payload.get("resourceId").and_then(Value::as_str) {
            return reference.parse().map_err(TaskError::from);
        }

        let resource_type = self
            .payload
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::invalid_payload("missing 'resourceId' or 'resourceType'"))?
            .parse::<ResourceType>()?;
        let id = self
            .payload
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| TaskError::invalid_payload("missing 'id'"))?;

        match self.payload.get("query").and_then(Value::as_str) {
            Some(query) => Ok(CacheKey::with_query(resource_type, id, query)?),
            None => Ok(CacheKey::new(resource_type, id)?),
        }
    }
}

/// Why a task failed. Rendered into the response `error` field.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{}: {}", .0.kind(), .0)]
    Origin(#[from] OriginError),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("task aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}

impl From<CoreError> for TaskError {
    fn from(err: CoreError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Correlated reply to one task. Serialized as-is on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub response_time_ms: u64,
}

impl TaskResponse {
    pub fn from_result(task_id: String, received_at: Instant, result: Result<Value, TaskError>) -> Self {
        let (success, data, error) = match result {
            Ok(data) => (true, Some(data), None),
            Err(e) => (false, None, Some(e.to_string())),
        };
        Self {
            id: task_id,
            success,
            data,
            error,
            timestamp: now_millis(),
            response_time_ms: received_at.elapsed().as_millis() as u64,
        }
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
