//! Deadlock detection: cycle search plus deterministic victim selection.
//!
//! The cycle search itself lives in [`crate::graph`]; this module adds the
//! victim-selection rule on top — "the waitor whose oldest held lock is
//! youngest self-aborts" — and the robustness rule that a stale access
//! entry (its lock already released by the time victim selection reads it)
//! is skipped rather than treated as an error.

use crate::error::StoreError;
use crate::graph;
use crate::keys::{self, Mode, Owner};
use crate::store::Store;
use crate::time::Timestamp;

/// Run one deadlock check for `self_owner`, currently blocked acquiring
/// `name` in `mode`. Returns `true` iff `self_owner` is the elected victim.
pub async fn check(
    store: &dyn Store,
    prefix: &str,
    name: &str,
    mode: Mode,
    self_owner: &Owner,
) -> Result<bool, StoreError> {
    let rsrc = keys::rsrc_key(prefix, name);
    graph::rebuild_wait_set(store, prefix, self_owner, &rsrc, mode).await?;

    let Some(cycle) = graph::find_cycle(store, prefix, self_owner).await? else {
        return Ok(false);
    };

    match select_victim(store, prefix, &cycle).await? {
        Some(victim) => Ok(victim == *self_owner),
        // Nobody in the cycle still holds a lock record; nothing to abort yet.
        None => Ok(false),
    }
}

/// Pick the cycle member with the newest "oldest access time" — the one
/// that has lived shortest holding any lock. Ties go to whoever appears
/// first in `cycle`.
async fn select_victim(
    store: &dyn Store,
    prefix: &str,
    cycle: &[Owner],
) -> Result<Option<Owner>, StoreError> {
    let mut victim: Option<(Owner, Timestamp)> = None;

    for owner in cycle {
        let Some(oldest) = oldest_access_time(store, prefix, owner).await? else {
            continue;
        };
        victim = match victim {
            None => Some((owner.clone(), oldest)),
            Some((_, current_newest)) if oldest > current_newest => Some((owner.clone(), oldest)),
            kept => kept,
        };
    }

    Ok(victim.map(|(owner, _)| owner))
}

/// The minimum first-grant time across every lock `owner`'s access set names.
/// Entries whose lock record has since disappeared are skipped.
async fn oldest_access_time(
    store: &dyn Store,
    prefix: &str,
    owner: &Owner,
) -> Result<Option<Timestamp>, StoreError> {
    let accesses = store.smembers(&keys::owner_key(prefix, owner)).await?;
    let mut oldest: Option<Timestamp> = None;

    for access in accesses {
        let Some((mode_char, name)) = access.split_once(':') else {
            continue;
        };
        let Some(mode) = Mode::from_char(mode_char.chars().next().unwrap_or('?')) else {
            continue;
        };
        let lock_key = keys::lock_key(prefix, name, mode, owner);
        let Some(value) = store.get(&lock_key).await? else {
            continue;
        };
        let Some((_, time)) = keys::decode_grant(&value) else {
            continue;
        };
        oldest = Some(match oldest {
            Some(current) if current < time => current,
            _ => time,
        });
    }

    Ok(oldest)
}
