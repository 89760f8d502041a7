//! # relay-server
//!
//! Tiered cache orchestration in front of a rate-limited upstream API.
//!
//! Reads go through an ordered chain of cache tiers (memory, Redis, Postgres) with
//! promotion into faster tiers; misses reach the origin once per key no matter how many
//! callers are waiting. A deduplicating priority queue refreshes stale or changed resources
//! in the background, a worker pool serves datagram requests, and a small axum surface
//! exposes stats and control endpoints.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod origin;
pub mod refresh;
pub mod relay;
pub mod server;
pub mod service;
pub mod workers;

pub use config::{AppConfig, CacheConfig, GatewayConfig, RedisConfig, ServerConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use relay::{Relay, RelayError, RelayOptions, RelayStats};
pub use server::{AppState, RelayServer, ServerBuilder, build_app};
