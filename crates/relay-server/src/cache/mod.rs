//! Tiered cache.
//!
//! ## Architecture
//!
//! - **Tiers**: ordered `StoreAdapter`s (memory, Redis, PostgreSQL), fastest first
//! - **TTL policy**: per-tier default, per-resource-type overrides, per-call overrides
//! - **Codec**: records are stored as MessagePack bytes
//!
//! ## Graceful Degradation
//!
//! A tier that is unreachable at startup is left out of the chain; a tier that fails at
//! runtime is treated as a miss and logged.

pub mod chain;
pub mod codec;
pub mod redis;
pub mod stats;
pub mod ttl;

pub use chain::{Tier, TierChain};
pub use codec::{CodecError, decode_record, encode_record};
pub use redis::RedisStore;
pub use stats::{TierStats, TierStatsSnapshot};
pub use ttl::{TtlOverrides, TtlPolicy};
