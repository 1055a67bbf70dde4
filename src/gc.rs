//! Crash-recovery garbage collection.
//!
//! Reclaims every lock, grant, access, and wait entry left behind by a
//! client that disappeared without calling `unlock`. The ordering here is
//! safety-critical: candidate owners are listed from the store *before*
//! the active-connection list is read, so a client that connects
//! mid-sweep can never be misclassified as stale.

use std::fmt;

use fxhash::FxHashSet;

use crate::error::StoreError;
use crate::keys::{self, Mode, Owner};
use crate::store::Store;

/// Counts from one GC pass, `Display`ed in the reference implementation's
/// literal format — integration tests assert against this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct GcSummary {
    pub locks_removed: usize,
    pub waits_removed: usize,
    pub owners_removed: usize,
}

impl fmt::Display for GcSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gc: {} lock(s), {} wait(s), {} owner(s)",
            self.locks_removed, self.waits_removed, self.owners_removed
        )
    }
}

/// Run one GC pass against `store`, keyed under `prefix`.
pub async fn run(store: &dyn Store, prefix: &str) -> Result<GcSummary, StoreError> {
    // 1 & 2: list candidates before active connections.
    let candidate_owners = strip_and_parse(store.keys(&keys::owner_pattern(prefix)).await?, prefix, "owner:");
    let candidate_waiters = strip_and_parse(store.keys(&keys::wait_pattern(prefix)).await?, prefix, "wait:");

    // 3: active owners, from registered connection names.
    let active: FxHashSet<Owner> = store
        .client_list()
        .await?
        .iter()
        .filter_map(|name| name.strip_prefix("redisrwlock:"))
        .filter_map(Owner::parse)
        .collect();

    // 4: stale = candidates \ active. A waiter with no owner record at all
    // (killed before ever acquiring anything, scenario: GC of stale wait)
    // is judged by the same active-connection test, not by membership in
    // the owner-derived stale set — otherwise a lock-less blocked crash
    // would never be reclaimed.
    let stale: FxHashSet<Owner> = candidate_owners
        .iter()
        .filter(|o| !active.contains(o))
        .cloned()
        .collect();
    let stale_waiters: FxHashSet<Owner> = candidate_waiters
        .iter()
        .filter(|o| !active.contains(o))
        .cloned()
        .collect();

    let mut summary = GcSummary::default();

    // 5: release every lock/grant a stale owner held.
    for owner in &stale {
        let owner_key = keys::owner_key(prefix, owner);
        let accesses = store.smembers(&owner_key).await?;
        for access in accesses {
            let Some((mode_char, name)) = access.split_once(':') else {
                continue;
            };
            let Some(mode) = Mode::from_char(mode_char.chars().next().unwrap_or('?')) else {
                continue;
            };
            release_stale_grant(store, prefix, name, mode, owner).await?;
            summary.locks_removed += 1;
        }
    }

    // 6: drop wait sets belonging to stale waiters. Incoming edges from
    // live waiters are left alone; they age out next retry cycle.
    for waiter in &candidate_waiters {
        if stale_waiters.contains(waiter) {
            store.del(&keys::wait_key(prefix, waiter)).await?;
            summary.waits_removed += 1;
        }
    }

    // 7: drop the owner records themselves.
    for owner in &stale {
        if store.del(&keys::owner_key(prefix, owner)).await? {
            summary.owners_removed += 1;
        }
    }

    Ok(summary)
}

async fn release_stale_grant(
    store: &dyn Store,
    prefix: &str,
    name: &str,
    mode: Mode,
    owner: &Owner,
) -> Result<(), StoreError> {
    let rsrc_key = keys::rsrc_key(prefix, name);
    let lock_key = keys::lock_key(prefix, name, mode, owner);
    store.del(&lock_key).await?;
    store.srem(&rsrc_key, &format!("{mode}:{owner}")).await?;
    if store.scard(&rsrc_key).await? == 0 {
        store.del(&rsrc_key).await?;
    }
    Ok(())
}

fn strip_and_parse(keys: Vec<String>, prefix: &str, tag: &str) -> Vec<Owner> {
    let full_tag = if prefix.is_empty() {
        tag.to_string()
    } else {
        format!("{prefix}:{tag}")
    };
    keys.iter()
        .filter_map(|k| k.strip_prefix(&full_tag))
        .filter_map(Owner::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn summary_format_matches_reference_implementation() {
        let summary = GcSummary {
            locks_removed: 1,
            waits_removed: 0,
            owners_removed: 1,
        };
        assert_eq!(summary.to_string(), "gc: 1 lock(s), 0 wait(s), 1 owner(s)");
    }

    #[tokio::test]
    async fn reclaims_a_crashed_owners_lock() {
        let store = MemoryStore::new();
        let dead = Owner::new("node", 1);

        let rsrc = keys::rsrc_key("", "N-GC1");
        let lock = keys::lock_key("", "N-GC1", Mode::Read, &dead);
        let owner_key = keys::owner_key("", &dead);

        store.sadd(&rsrc, &format!("R:{dead}")).await.unwrap();
        store
            .set(&lock, &keys::encode_grant(1, &crate::time::Timestamp::new(1, 0)))
            .await
            .unwrap();
        store.sadd(&owner_key, "R:N-GC1").await.unwrap();
        // dead never registered a client name, so it's stale immediately.

        let summary = run(&store, "").await.unwrap();
        assert_eq!(summary.locks_removed, 1);
        assert_eq!(summary.owners_removed, 1);
        assert_eq!(store.get(&lock).await.unwrap(), None);
        assert_eq!(store.smembers(&rsrc).await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn live_owners_are_untouched() {
        let store = MemoryStore::new();
        let alive = Owner::new("node", 2);
        store.set_client_name(&alive.client_name()).await.unwrap();

        let lock = keys::lock_key("", "N1", Mode::Write, &alive);
        store
            .set(&lock, &keys::encode_grant(1, &crate::time::Timestamp::new(1, 0)))
            .await
            .unwrap();
        store.sadd(&keys::owner_key("", &alive), "W:N1").await.unwrap();

        let summary = run(&store, "").await.unwrap();
        assert_eq!(summary.locks_removed, 0);
        assert_eq!(summary.owners_removed, 0);
        assert!(store.get(&lock).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reclaims_a_stale_wait_set() {
        let store = MemoryStore::new();
        let dead = Owner::new("node", 9);
        store.sadd(&keys::wait_key("", &dead), "__dummy_seed_waitee__").await.unwrap();

        let summary = run(&store, "").await.unwrap();
        assert_eq!(summary.waits_removed, 1);
        assert!(store.smembers(&keys::wait_key("", &dead)).await.unwrap().is_empty());
    }
}
