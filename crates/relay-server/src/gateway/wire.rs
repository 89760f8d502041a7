//! Datagram wire format and validation.

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::workers::{InboundTask, TaskType};

/// Request datagram as sent by clients.
///
/// `{ "id": "...", "type": "resource_detail", "payload": {...}, "timestamp": 1700000000000 }`
#[derive(Debug, Deserialize)]
struct DatagramRequest {
    id: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    payload: Map<String, Value>,
    #[allow(dead_code)]
    timestamp: Number,
}

/// Why a datagram was refused. Refused datagrams get no response.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("datagram of {size} bytes exceeds limit of {max} bytes")]
    Oversized { size: usize, max: usize },

    #[error("malformed datagram: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Label used for drop metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Oversized { .. } => "oversized",
            Self::Malformed(_) => "invalid",
        }
    }
}

/// Checks the size cap, then parses. Only a fully-formed request becomes a task.
pub fn validate_datagram(bytes: &[u8], max_bytes: usize) -> Result<InboundTask, ValidationError> {
    if bytes.len() > max_bytes {
        return Err(ValidationError::Oversized {
            size: bytes.len(),
            max: max_bytes,
        });
    }

    let request: DatagramRequest =
        serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    if request.id.trim().is_empty() {
        return Err(ValidationError::Malformed("empty id".to_string()));
    }

    Ok(InboundTask::new(
        request.id,
        request.task_type,
        Value::Object(request.payload),
    ))
}
