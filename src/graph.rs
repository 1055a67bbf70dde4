//! Wait-for graph maintenance and cycle search.
//!
//! Grounded in shape on `deloxide`'s `WaitForGraph` (forward/reverse
//! adjacency maps with a cached-buffer BFS for cycle detection) but reading
//! its adjacency lazily from the [`Store`] on every call rather than
//! keeping an in-process map — the graph here is genuinely distributed,
//! shared by every client through `wait:{owner}` sets, so there is no
//! single process that could own an in-memory copy of it.

use crate::error::StoreError;
use crate::keys::{self, Mode, Owner, DUMMY_SEED_WAITEE};
use crate::store::Store;

/// Rebuild `wait:{self_owner}` ahead of a deadlock check.
///
/// `rsrc_key` is the grant set of the resource `self_owner` is currently
/// blocked on acquiring in `mode`.
pub async fn rebuild_wait_set(
    store: &dyn Store,
    prefix: &str,
    self_owner: &Owner,
    rsrc_key: &str,
    mode: Mode,
) -> Result<(), StoreError> {
    let self_wait_key = keys::wait_key(prefix, self_owner);

    // Seeded first so the set is never observed empty by a concurrent
    // detector's SCARD probe while this function is still running.
    store.sadd(&self_wait_key, DUMMY_SEED_WAITEE).await?;

    let grants = store.smembers(rsrc_key).await?;
    for grant in grants {
        let Some((grant_mode, grant_owner)) = grant.split_once(':') else {
            continue;
        };
        let Some(grant_mode) = Mode::from_char(grant_mode.chars().next().unwrap_or('?')) else {
            continue;
        };
        if grant_owner == self_owner.to_string() {
            continue;
        }
        if !grant_mode.conflicts_with(mode) {
            continue;
        }

        let other_wait_key = keys::wait_key(prefix, &Owner::parse(grant_owner).unwrap_or_else(|| {
            Owner::new(grant_owner, 0)
        }));
        if store.scard(&other_wait_key).await? > 0 {
            store.sadd(&self_wait_key, grant_owner).await?;
        } else {
            store.srem(&self_wait_key, grant_owner).await?;
        }
    }

    Ok(())
}

/// Remove `wait:{owner}`, the transient rebuild-each-retry set.
pub async fn clear_wait_set(store: &dyn Store, prefix: &str, owner: &Owner) -> Result<(), StoreError> {
    store.del(&keys::wait_key(prefix, owner)).await?;
    Ok(())
}

/// Depth-first search for a cycle in the wait-for graph rooted at `start`.
///
/// Returns the ordered cycle members when one including `start` exists.
/// The placeholder seed member is a terminal leaf, never a real edge.
///
/// Formulated iteratively over an explicit stack of `(waitees, next_index)`
/// frames rather than recursively, to avoid deep call-stack concerns for
/// pathological cycles; `frames` and `path` stay
/// the same length throughout, each frame describing the children of the
/// path element at the same depth.
pub async fn find_cycle(
    store: &dyn Store,
    prefix: &str,
    start: &Owner,
) -> Result<Option<Vec<Owner>>, StoreError> {
    let mut path: Vec<Owner> = vec![start.clone()];
    let mut visited = fxhash::FxHashSet::default();
    visited.insert(start.clone());

    let root_waitees = store.smembers(&keys::wait_key(prefix, start)).await?;
    let mut frames: Vec<(Vec<String>, usize)> = vec![(root_waitees, 0)];

    while let Some((waitees, idx)) = frames.last_mut() {
        if *idx >= waitees.len() {
            frames.pop();
            path.pop();
            continue;
        }
        let waitee = waitees[*idx].clone();
        *idx += 1;

        if waitee == DUMMY_SEED_WAITEE {
            continue;
        }
        let Some(owner) = Owner::parse(&waitee) else {
            continue;
        };

        if let Some(pos) = path.iter().position(|o| *o == owner) {
            return Ok(Some(path[pos..].to_vec()));
        }
        if visited.contains(&owner) {
            continue;
        }

        visited.insert(owner.clone());
        path.push(owner.clone());
        let child_waitees = store.smembers(&keys::wait_key(prefix, &owner)).await?;
        frames.push((child_waitees, 0));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn rebuild_prunes_non_waiting_conflicting_holders() {
        let store = MemoryStore::new();
        let a = Owner::new("node", 1);
        let b = Owner::new("node", 2);
        let rsrc = keys::rsrc_key("", "R1");

        store.sadd(&rsrc, &format!("W:{b}")).await.unwrap();
        // b holds W but isn't waiting on anything: a's wait set must not include b.
        rebuild_wait_set(&store, "", &a, &rsrc, Mode::Write).await.unwrap();
        let wait = store.smembers(&keys::wait_key("", &a)).await.unwrap();
        assert!(!wait.contains(&b.to_string()));
    }

    #[tokio::test]
    async fn rebuild_adds_waiting_conflicting_holders() {
        let store = MemoryStore::new();
        let a = Owner::new("node", 1);
        let b = Owner::new("node", 2);
        let rsrc = keys::rsrc_key("", "R1");

        store.sadd(&rsrc, &format!("W:{b}")).await.unwrap();
        store.sadd(&keys::wait_key("", &b), "someone-else").await.unwrap();

        rebuild_wait_set(&store, "", &a, &rsrc, Mode::Write).await.unwrap();
        let wait = store.smembers(&keys::wait_key("", &a)).await.unwrap();
        assert!(wait.contains(&b.to_string()));
    }

    #[tokio::test]
    async fn finds_two_party_cycle() {
        let store = MemoryStore::new();
        let a = Owner::new("node", 1);
        let b = Owner::new("node", 2);
        store.sadd(&keys::wait_key("", &a), &b.to_string()).await.unwrap();
        store.sadd(&keys::wait_key("", &b), &a.to_string()).await.unwrap();

        let cycle = find_cycle(&store, "", &a).await.unwrap().unwrap();
        assert_eq!(cycle, vec![a, b]);
    }

    #[tokio::test]
    async fn no_cycle_when_chain_is_acyclic() {
        let store = MemoryStore::new();
        let a = Owner::new("node", 1);
        let b = Owner::new("node", 2);
        store.sadd(&keys::wait_key("", &a), &b.to_string()).await.unwrap();

        assert!(find_cycle(&store, "", &a).await.unwrap().is_none());
    }
}
