//! Connection configuration for the Redis-backed store.
//!
//! Grounded on `acteon-state-redis`'s `RedisConfig`, trimmed to the fields
//! this crate's scope actually needs — no TLS knobs, since the wire
//! protocol to the store is explicitly out of scope.

use std::time::Duration;

/// How to reach the shared store and how to share it among keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379`.
    pub url: String,

    /// Prefix prepended to every key this crate writes, so multiple
    /// logical services can share one store without colliding.
    pub prefix: String,

    /// Size of the underlying `deadpool-redis` connection pool.
    pub pool_size: usize,

    /// How long to wait for a pooled connection before giving up.
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: String::from("redis://127.0.0.1:6379"),
            prefix: String::new(),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RedisConfig {
            url: url.into(),
            ..RedisConfig::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}
