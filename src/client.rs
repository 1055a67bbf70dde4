//! The public lock client: retry loop, token, and status.

use std::time::Duration;

use crate::detector;
use crate::error::StoreError;
use crate::gc::{self, GcSummary};
use crate::graph;
use crate::keys::{self, Mode, Owner};
use crate::store::{ScriptKind, Store};

/// Sentinel `timeout` requesting `lock` retry indefinitely until `Ok` or
/// `Deadlock`.
pub const FOREVER: f64 = -1.0;

/// Default `retry_interval`, matching the reference implementation.
pub const DEFAULT_RETRY_INTERVAL: f64 = 0.1;

/// Outcome of a `lock` call. Not an error type — see [`StoreError`]
/// for what actually propagates as `Result::Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Ok,
    Fail,
    Timeout,
    Deadlock,
}

/// The value returned from `lock`, and the handle passed back to `unlock`.
///
/// Binds exclusively to the owner identity of the client that produced it;
/// handing it to a different client's `unlock` releases nothing, since the
/// derived lock key simply won't match any grant that client holds.
#[derive(Debug, Clone)]
pub struct Rwlock {
    pub name: String,
    pub mode: Mode,
    pub owner: Owner,
    pub status: Status,
}

impl Rwlock {
    /// Whether this token represents a successfully held lock.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// A handle over a [`Store`] connection plus an owner identity.
///
/// No process-wide state is required beyond this: constructing one
/// per use is fine, though a long-lived client amortizes the connection
/// pool and registers its name once.
pub struct RwlockClient<S: Store> {
    store: S,
    prefix: String,
    owner: Owner,
}

impl<S: Store> RwlockClient<S> {
    /// Construct a client bound to `{node}/{pid}` and register its
    /// connection name on the store.
    pub async fn new(store: S, prefix: impl Into<String>, node: impl Into<String>, pid: u32) -> Result<Self, StoreError> {
        let owner = Owner::new(node, pid);
        store.set_client_name(&owner.client_name()).await?;
        Ok(RwlockClient {
            store,
            prefix: prefix.into(),
            owner,
        })
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Acquire `name` in `mode`. `timeout` controls the exact retry
    /// semantics: `0.0` tries once and returns `Fail` on conflict; `FOREVER`
    /// retries until `Ok` or `Deadlock`; any other positive value retries
    /// until that many seconds have elapsed, then returns `Timeout`.
    pub async fn lock(
        &self,
        name: &str,
        mode: Mode,
        timeout: f64,
        retry_interval: f64,
    ) -> Result<Rwlock, StoreError> {
        let rsrc_key = keys::rsrc_key(&self.prefix, name);
        let lock_key = keys::lock_key(&self.prefix, name, mode, &self.owner);
        let owner_key = keys::owner_key(&self.prefix, &self.owner);

        let mode_str = mode.to_string();
        let owner_str = self.owner.to_string();

        let deadline = if timeout > 0.0 {
            Some(tokio::time::Instant::now() + Duration::from_secs_f64(timeout))
        } else {
            None
        };

        let status = loop {
            let now = self.store.server_time().await?;
            let now_str = now.to_string();

            let granted = self
                .store
                .eval_script(
                    ScriptKind::Grant,
                    &[&rsrc_key, &lock_key, &owner_key],
                    &[&mode_str, &owner_str, &now_str],
                )
                .await?;

            if granted {
                break Status::Ok;
            }

            if timeout == 0.0 {
                break Status::Fail;
            }

            if detector::check(&self.store, &self.prefix, name, mode, &self.owner).await? {
                break Status::Deadlock;
            }

            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    break Status::Timeout;
                }
            }

            tokio::time::sleep(Duration::from_secs_f64(retry_interval.max(0.0))).await;
        };

        // Every exit path clears the transient wait set.
        graph::clear_wait_set(&self.store, &self.prefix, &self.owner).await?;

        Ok(Rwlock {
            name: name.to_string(),
            mode,
            owner: self.owner.clone(),
            status,
        })
    }

    /// Release a lock previously returned by [`RwlockClient::lock`] with
    /// `status == Ok`. Returns `false` if the lock record no longer exists.
    pub async fn unlock(&self, token: &Rwlock) -> Result<bool, StoreError> {
        let rsrc_key = keys::rsrc_key(&self.prefix, &token.name);
        let lock_key = keys::lock_key(&self.prefix, &token.name, token.mode, &token.owner);
        let owner_key = keys::owner_key(&self.prefix, &token.owner);
        let mode_str = token.mode.to_string();
        let owner_str = token.owner.to_string();

        self.store
            .eval_script(
                ScriptKind::Release,
                &[&rsrc_key, &lock_key, &owner_key],
                &[&mode_str, &owner_str],
            )
            .await
    }

    /// Run one garbage-collection pass.
    pub async fn gc(&self) -> Result<GcSummary, StoreError> {
        gc::run(&self.store, &self.prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn client(node: &str, pid: u32) -> RwlockClient<MemoryStore> {
        RwlockClient::new(MemoryStore::new(), "", node, pid).await.unwrap()
    }

    async fn shared_client(store: MemoryStore, node: &str, pid: u32) -> RwlockClient<MemoryStore> {
        RwlockClient::new(store, "", node, pid).await.unwrap()
    }

    #[tokio::test]
    async fn simple_read_lock_and_unlock() {
        let c = client("n1", 1).await;
        let token = c.lock("N1", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(token.status, Status::Ok);
        assert!(c.unlock(&token).await.unwrap());
    }

    #[tokio::test]
    async fn excessive_unlock_returns_false() {
        let c = client("n1", 1).await;
        let token = c.lock("N1", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert!(c.unlock(&token).await.unwrap());
        assert!(!c.unlock(&token).await.unwrap());
    }

    #[tokio::test]
    async fn nested_read_then_write_same_owner() {
        let c = client("n1", 1).await;
        let read_token = c.lock("N2", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(read_token.status, Status::Ok);
        let write_token = c.lock("N2", Mode::Write, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(write_token.status, Status::Ok);

        assert!(c.unlock(&read_token).await.unwrap());
        assert!(c.unlock(&write_token).await.unwrap());

        assert!(c.store.smembers(&keys::rsrc_key("", "N2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflict_with_zero_timeout_fails_without_waiting() {
        let store = MemoryStore::new();
        let a = shared_client(store.clone(), "n1", 1).await;
        let b = shared_client(store.clone(), "n2", 2).await;

        let a_token = a.lock("N1", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(a_token.status, Status::Ok);

        let b_token = b.lock("N1", Mode::Write, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(b_token.status, Status::Fail);
    }

    #[tokio::test]
    async fn conflict_with_finite_timeout_eventually_times_out() {
        let store = MemoryStore::new();
        let a = shared_client(store.clone(), "n1", 1).await;
        let b = shared_client(store.clone(), "n2", 2).await;

        let a_token = a.lock("N1", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(a_token.status, Status::Ok);

        let start = tokio::time::Instant::now();
        let b_token = b.lock("N1", Mode::Write, 0.2, 0.05).await.unwrap();
        assert_eq!(b_token.status, Status::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(200));

        // wait-set hygiene: no residual wait entry after returning.
        assert!(store.smembers(&keys::wait_key("", b.owner())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wait_set_is_absent_after_any_lock_call() {
        let c = client("n1", 1).await;
        let token = c.lock("N1", Mode::Read, 0.0, DEFAULT_RETRY_INTERVAL).await.unwrap();
        assert_eq!(token.status, Status::Ok);
        assert!(c
            .store
            .smembers(&keys::wait_key("", c.owner()))
            .await
            .unwrap()
            .is_empty());
    }
}
