//! Background refresh: job model, deduplicating queue, single-flight gate and sweep tracking.

pub mod job;
pub mod queue;
pub mod singleflight;
pub mod tracking;

pub use job::{RefreshJob, RefreshReason};
pub use queue::{JobOutcome, QueueStatus, QueuedJobSummary, RefreshQueue, RefreshSettings};
pub use singleflight::{FlightAborted, SingleFlight};
pub use tracking::TrackedResources;
