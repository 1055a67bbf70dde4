//! Key-space layout and the `owner`/`mode` identifiers woven through it.
//!
//! Everything this crate stores in the backing key-value store lives under
//! one of four key shapes, all rooted at an optional prefix:
//!
//! - `rsrc:{name}`            — existence marker for a resource that has ever been locked
//! - `lock:{name}:{mode}:{owner}` — a grant: value is `{refcount}:{sec.usec}`
//! - `owner:{owner}`          — marks an owner as having at least one live grant
//! - `wait:{owner}`           — the set of owners `{owner}` is currently blocked behind
//!
//! `{owner}` is always rendered `{node}/{pid}`, matching the client
//! registration name `redisrwlock:{node}/{pid}` used for crash detection in
//! garbage collection.

use std::fmt;

/// A lock mode: shared (read) or exclusive (write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    /// Single-character wire form, matching the original `R`/`W` tags.
    pub fn as_char(self) -> char {
        match self {
            Mode::Read => 'R',
            Mode::Write => 'W',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'R' => Some(Mode::Read),
            'W' => Some(Mode::Write),
            _ => None,
        }
    }

    /// Whether two modes held concurrently by *different* owners conflict.
    pub fn conflicts_with(self, other: Mode) -> bool {
        !(self == Mode::Read && other == Mode::Read)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// The identity of a lock holder: `{node}/{pid}`.
///
/// `node` distinguishes hosts (or logical clients) sharing one store;
/// `pid` distinguishes processes on a node so a crashed process's grants
/// can be told apart from a live sibling's during GC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner {
    pub node: String,
    pub pid: u32,
}

impl Owner {
    pub fn new(node: impl Into<String>, pid: u32) -> Self {
        Owner {
            node: node.into(),
            pid,
        }
    }

    /// Parse an `{node}/{pid}` string back into its parts.
    ///
    /// The node itself may not contain `/`; if it did, `rsplit_once` below
    /// would still split correctly since `pid` is the final numeric segment.
    pub fn parse(s: &str) -> Option<Self> {
        let (node, pid) = s.rsplit_once('/')?;
        let pid: u32 = pid.parse().ok()?;
        Some(Owner {
            node: node.to_string(),
            pid,
        })
    }

    /// The connection name this owner registers with the store, used by
    /// GC to cross-reference live connections.
    pub fn client_name(&self) -> String {
        format!("redisrwlock:{}", self)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.pid)
    }
}

/// Placeholder waitee seeded into `wait:{owner}` before a real waitee is
/// known, so the set is never observed empty by a concurrent GC pass
/// mid-retry; the set is rebuilt fresh on every retry.
pub const DUMMY_SEED_WAITEE: &str = "__dummy_seed_waitee__";

fn with_prefix(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{prefix}:{rest}")
    }
}

pub fn rsrc_key(prefix: &str, name: &str) -> String {
    with_prefix(prefix, &format!("rsrc:{name}"))
}

pub fn lock_key(prefix: &str, name: &str, mode: Mode, owner: &Owner) -> String {
    with_prefix(prefix, &format!("lock:{name}:{mode}:{owner}"))
}

/// The prefix shared by every grant on `name`, for use with [`crate::store::Store::keys`].
pub fn lock_pattern(prefix: &str, name: &str) -> String {
    with_prefix(prefix, &format!("lock:{name}:*"))
}

/// The prefix shared by every grant held anywhere, for use during GC sweeps.
pub fn lock_pattern_all(prefix: &str) -> String {
    with_prefix(prefix, "lock:*")
}

pub fn owner_key(prefix: &str, owner: &Owner) -> String {
    with_prefix(prefix, &format!("owner:{owner}"))
}

pub fn owner_pattern(prefix: &str) -> String {
    with_prefix(prefix, "owner:*")
}

pub fn wait_key(prefix: &str, owner: &Owner) -> String {
    with_prefix(prefix, &format!("wait:{owner}"))
}

pub fn wait_pattern(prefix: &str) -> String {
    with_prefix(prefix, "wait:*")
}

/// Parse a `lock:{name}:{mode}:{owner}` key back into its components.
///
/// Locates the `lock:` marker rather than requiring a specific prefix to be
/// stripped first, the same way the grant/release Lua scripts find it with
/// an unanchored `string.match` — so this works whether or not a key
/// prefix was configured, without the caller needing to know it.
pub fn parse_lock_key(key: &str) -> Option<(String, Mode, Owner)> {
    let idx = key.find("lock:")?;
    let rest = &key[idx + "lock:".len()..];
    let mut parts = rest.splitn(3, ':');
    let name = parts.next()?.to_string();
    let mode = Mode::from_char(parts.next()?.chars().next()?)?;
    let owner = Owner::parse(parts.next()?)?;
    Some((name, mode, owner))
}

/// Encode a grant value: `{refcount}:{sec.usec}`.
pub fn encode_grant(refcount: i64, time: &crate::time::Timestamp) -> String {
    format!("{refcount}:{time}")
}

/// Decode a grant value back into `(refcount, time)`.
pub fn decode_grant(value: &str) -> Option<(i64, crate::time::Timestamp)> {
    let (refcount, time) = value.split_once(':')?;
    let refcount: i64 = refcount.parse().ok()?;
    let time = crate::time::Timestamp::parse(time)?;
    Some((refcount, time))
}
