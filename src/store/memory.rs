//! An in-memory [`Store`] for deterministic unit and integration tests —
//! no network, no external process.
//!
//! Grounded on the conformance-test-double pattern used across the pack
//! (e.g. `acteon-state-state`'s `testing::run_store_conformance_tests`
//! against a trait object): rather than mocking individual calls, this is
//! a second real implementation of [`Store`] that the same algorithms run
//! against unmodified.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use fxhash::FxHashMap;

use super::{ScriptKind, Store};
use crate::error::StoreError;
use crate::time::Timestamp;

// Sets use BTreeSet rather than the FxHashMap used for the top-level maps
// so smembers() iterates in a stable order — handy for reproducing test
// assertions without relying on hash-order.
#[derive(Default)]
struct Inner {
    strings: FxHashMap<String, String>,
    sets: FxHashMap<String, BTreeSet<String>>,
    clients: BTreeSet<String>,
}

/// A `Mutex`-guarded, process-local stand-in for the shared store.
///
/// Cloning a `MemoryStore` shares the same backing state (it's an `Arc`
/// internally via the shared `Mutex`) — construct one per simulated
/// connection and call [`MemoryStore::set_client_name`] on each to model
/// distinct owners, then drop (or [`MemoryStore::forget_client`]) one to
/// simulate that connection crashing.
#[derive(Clone)]
pub struct MemoryStore {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: std::sync::Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Simulate an owner's connection going away without a clean
    /// unregister, the crash scenario garbage collection exists for.
    pub fn forget_client(&self, name: &str) {
        self.inner.lock().unwrap().clients.remove(name);
    }

    /// Wipe every key this store holds. Test-only, mirroring the reference
    /// implementation's private `_clear_all()` escape hatch — never
    /// exposed outside of test builds.
    #[cfg(test)]
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.strings.clear();
        inner.sets.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = key;
    for (i, seg) in segments.iter().enumerate() {
        if seg.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(seg) {
                return false;
            }
            rest = &rest[seg.len()..];
        } else if i == segments.len() - 1 {
            return rest.ends_with(seg);
        } else {
            match rest.find(seg) {
                Some(pos) => rest = &rest[pos + seg.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().unwrap().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let removed_string = inner.strings.remove(key).is_some();
        let removed_set = inner.sets.remove(key).is_some();
        Ok(removed_string || removed_set)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let value: i64 = entry
            .parse()
            .map_err(|_| StoreError::serialization(key, "not an integer"))?;
        let next = value + 1;
        *entry = next.to_string();
        Ok(next)
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let value: i64 = entry
            .parse()
            .map_err(|_| StoreError::serialization(key, "not an integer"))?;
        let next = value - 1;
        *entry = next.to_string();
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let removed = match inner.sets.get_mut(key) {
            Some(set) => set.remove(member),
            None => false,
        };
        if matches!(inner.sets.get(key), Some(set) if set.is_empty()) {
            inner.sets.remove(key);
        }
        Ok(removed)
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).map(|s| s.len()).unwrap_or(0))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.sets.keys())
            .filter(|k| matches_pattern(pattern, k))
            .cloned()
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn server_time(&self) -> Result<Timestamp, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Timestamp::new(now.as_secs() as i64, now.subsec_micros() as i64))
    }

    async fn set_client_name(&self, name: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().clients.insert(name.to_string());
        Ok(())
    }

    async fn client_list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().unwrap().clients.iter().cloned().collect())
    }

    async fn eval_script(
        &self,
        kind: ScriptKind,
        keys: &[&str],
        args: &[&str],
    ) -> Result<bool, StoreError> {
        let rsrc = keys[0];
        let lock = keys[1];
        let owner_key = keys[2];
        let mode = args[0];
        let owner = args[1];

        let (name, _mode, _owner) = crate::keys::parse_lock_key(lock)
            .ok_or_else(|| StoreError::serialization(lock, "malformed lock key"))?;
        let access_member = format!("{mode}:{name}");

        let mut inner = self.inner.lock().unwrap();
        match kind {
            ScriptKind::Grant => {
                let now = args
                    .get(2)
                    .ok_or_else(|| StoreError::Script("grant requires a timestamp argument".into()))?;
                let grants = inner.sets.get(rsrc).cloned().unwrap_or_default();
                for grant in &grants {
                    if let Some((grant_mode, grant_owner)) = grant.split_once(':') {
                        if grant_owner != owner && !(grant_mode == "R" && mode == "R") {
                            return Ok(false);
                        }
                    }
                }
                inner
                    .sets
                    .entry(rsrc.to_string())
                    .or_default()
                    .insert(format!("{mode}:{owner}"));
                inner
                    .sets
                    .entry(owner_key.to_string())
                    .or_default()
                    .insert(access_member);
                match inner.strings.get(lock).cloned() {
                    None => {
                        inner.strings.insert(lock.to_string(), format!("1:{now}"));
                    }
                    Some(existing) => {
                        let (refcount, first_time) = crate::keys::decode_grant(&existing)
                            .ok_or_else(|| StoreError::serialization(lock, "malformed grant value"))?;
                        inner
                            .strings
                            .insert(lock.to_string(), crate::keys::encode_grant(refcount + 1, &first_time));
                    }
                }
                Ok(true)
            }
            ScriptKind::Release => {
                let existing = match inner.strings.get(lock).cloned() {
                    None => return Ok(false),
                    Some(v) => v,
                };
                let (refcount, first_time) = crate::keys::decode_grant(&existing)
                    .ok_or_else(|| StoreError::serialization(lock, "malformed grant value"))?;
                if refcount <= 1 {
                    inner.strings.remove(lock);
                    if let Some(set) = inner.sets.get_mut(rsrc) {
                        set.remove(&format!("{mode}:{owner}"));
                        if set.is_empty() {
                            inner.sets.remove(rsrc);
                        }
                    }
                    if let Some(set) = inner.sets.get_mut(owner_key) {
                        set.remove(&access_member);
                        if set.is_empty() {
                            inner.sets.remove(owner_key);
                        }
                    }
                } else {
                    inner
                        .strings
                        .insert(lock.to_string(), crate::keys::encode_grant(refcount - 1, &first_time));
                }
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("lock:*", "lock:widgets:R:a/1"));
        assert!(!matches_pattern("lock:*", "owner:a/1"));
        assert!(matches_pattern("owner:*", "owner:a/1"));
        assert!(matches_pattern("wait:*", "wait:a/1"));
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exact", "exactly"));
    }

    #[tokio::test]
    async fn basic_string_and_set_ops() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());

        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 1);
        assert!(store.srem("s", "a").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn client_registration_and_forgetting() {
        let store = MemoryStore::new();
        store.set_client_name("redisrwlock:node-a/1").await.unwrap();
        assert_eq!(store.client_list().await.unwrap(), vec!["redisrwlock:node-a/1".to_string()]);
        store.forget_client("redisrwlock:node-a/1");
        assert!(store.client_list().await.unwrap().is_empty());
    }
}
