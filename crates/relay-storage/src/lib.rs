//! # relay-storage
//!
//! Store adapter contract for relay cache tiers.
//!
//! Every tier of the cache is one [`StoreAdapter`]: a uniform `get/set/delete` over a single
//! backend. This crate holds the contract, its error and value types, and the in-process
//! [`MemoryStore`]. The Redis adapter lives in `relay-server`; the relational adapter lives in
//! `relay-db-postgres`.
//!
//! ## Example
//!
//! ```ignore
//! use relay_storage::{MemoryStore, StoreAdapter, StoreLookup};
//!
//! async fn read(store: &MemoryStore) {
//!     match store.get("character:1").await {
//!         Ok(StoreLookup::Hit(bytes)) => println!("{} bytes", bytes.len()),
//!         Ok(_) => println!("not cached"),
//!         Err(e) => eprintln!("store unavailable: {e}"),
//!     }
//! }
//! ```

mod error;
mod memory;
mod traits;
mod types;

pub use error::{ErrorCategory, StoreError};
pub use memory::{DEFAULT_MAX_ENTRIES, MemoryStore};
pub use traits::StoreAdapter;
pub use types::{CacheEntry, Payload, StoreLookup};
