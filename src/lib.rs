//! # redisrwlock
//!
//! A distributed reader-writer lock coordination service backed by a
//! shared key-value store. Multiple client processes, possibly on
//! different hosts, contend for named resources under either shared
//! (`READ`) or exclusive (`WRITE`) mode.
//!
//! Four properties make this non-trivial and are what this crate actually
//! implements:
//!
//! - conflict-free concurrent acquisition via a server-side atomic script,
//!   rather than a client-side compare-and-swap loop;
//! - reference-counted re-entrant ownership, so the same owner can nest
//!   `lock` calls for the same resource;
//! - distributed deadlock detection over a wait-for graph shared through
//!   the store, with a deterministic victim-selection rule; and
//! - garbage collection of locks, wait edges, and owner records left
//!   behind by a client that crashed without unlocking.
//!
//! ## Usage
//!
//! ```no_run
//! use redisrwlock::{Mode, RedisConfig, RedisStore, RwlockClient};
//!
//! # async fn run() -> Result<(), redisrwlock::StoreError> {
//! let store = RedisStore::new(&RedisConfig::default())?;
//! let client = RwlockClient::new(store, "myapp", "host-a", std::process::id()).await?;
//!
//! let token = client.lock("my-resource", Mode::Write, 5.0, 0.1).await?;
//! if token.is_ok() {
//!     // ... critical section ...
//!     client.unlock(&token).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The store backing a client is pluggable through the [`Store`] trait;
//! [`MemoryStore`] drives the same algorithms deterministically in tests
//! without a live Redis.

pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod gc;
pub mod graph;
pub mod keys;
pub mod store;
pub mod time;

pub use client::{Rwlock, RwlockClient, Status, DEFAULT_RETRY_INTERVAL, FOREVER};
pub use config::RedisConfig;
pub use error::StoreError;
pub use gc::GcSummary;
pub use keys::{Mode, Owner};
pub use store::MemoryStore;
#[cfg(feature = "redis-store")]
pub use store::RedisStore;
pub use store::{ScriptKind, Store};
pub use time::Timestamp;
