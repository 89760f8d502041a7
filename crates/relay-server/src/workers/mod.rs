//! Worker pool executing inbound tasks against the cache and origin.

pub mod pool;
pub mod task;

pub use pool::{Worker, WorkerContext, WorkerPool};
pub use task::{InboundTask, TaskError, TaskResponse, TaskType};
