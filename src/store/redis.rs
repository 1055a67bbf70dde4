//! The Redis-backed [`Store`] implementation.
//!
//! Grounded on `acteon-state-redis`'s `RedisDistributedLock`: a
//! `deadpool_redis::Pool` built from [`RedisConfig`], plain commands issued
//! with `redis::AsyncCommands`, and the two atomic routines run through
//! pre-built [`redis::Script`] handles rather than raw `EVAL` strings.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use redis::Script;

use crate::config::RedisConfig;
use crate::error::StoreError;
use crate::time::Timestamp;

use super::scripts;
use super::{ScriptKind, Store};

/// A pooled connection to Redis implementing the full [`Store`] surface.
pub struct RedisStore {
    pool: Pool,
    grant_script: Script,
    release_script: Script,
}

impl RedisStore {
    /// Build a connection pool from `config` and load the grant/release scripts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be constructed.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let cfg = PoolConfig::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(RedisStore {
            pool,
            grant_script: Script::new(scripts::GRANT_SCRIPT),
            release_script: Script::new(scripts::RELEASE_SCRIPT),
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set(key, value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr(key, 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.decr(key, 1)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .srem(key, member)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        conn.scard(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.smembers(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.keys(pattern)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn server_time(&self) -> Result<Timestamp, StoreError> {
        let mut conn = self.conn().await?;
        let (sec, usec): (i64, i64) = redis::cmd("TIME")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Timestamp::new(sec, usec))
    }

    async fn set_client_name(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("CLIENT")
            .arg("SETNAME")
            .arg(name)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn client_list(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let raw: String = redis::cmd("CLIENT")
            .arg("LIST")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(raw
            .lines()
            .filter_map(|line| {
                line.split_whitespace()
                    .find_map(|field| field.strip_prefix("name="))
                    .filter(|name| !name.is_empty())
                    .map(|name| name.to_string())
            })
            .collect())
    }

    async fn eval_script(
        &self,
        kind: ScriptKind,
        keys: &[&str],
        args: &[&str],
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let script = match kind {
            ScriptKind::Grant => &self.grant_script,
            ScriptKind::Release => &self.release_script,
        };

        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(*arg);
        }

        let result: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(e.to_string()))?;
        Ok(result == 1)
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix: format!("redisrwlock-test-{}", std::process::id()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn grant_and_release_round_trip() {
        let config = test_config();
        let store = RedisStore::new(&config).expect("pool creation should succeed");

        let owner = crate::keys::Owner::new("itest-node", std::process::id());
        let rsrc = crate::keys::rsrc_key(&config.prefix, "itest-resource");
        let lock = crate::keys::lock_key(&config.prefix, "itest-resource", crate::keys::Mode::Write, &owner);
        let owner_key = crate::keys::owner_key(&config.prefix, &owner);

        let granted = store
            .eval_script(ScriptKind::Grant, &[&rsrc, &lock, &owner_key], &["W", &owner.to_string(), "1.0"])
            .await
            .unwrap();
        assert!(granted);

        let released = store
            .eval_script(ScriptKind::Release, &[&rsrc, &lock, &owner_key], &["W", &owner.to_string()])
            .await
            .unwrap();
        assert!(released);
        assert_eq!(store.get(&lock).await.unwrap(), None);
    }
}
