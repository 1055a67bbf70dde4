//! Typed errors for the store adapter and its callers.
//!
//! These are distinct from [`crate::client::Status`]: FAIL/TIMEOUT/DEADLOCK are
//! expected, typed *outcomes* of a `lock()` call, never an `Err`. A `StoreError`
//! means the underlying key-value store could not be reached or misbehaved, and
//! is always propagated rather than folded into a status.

use thiserror::Error;

/// Errors from the store adapter and the lock/GC operations built on it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a connection (pool exhausted, network unreachable, auth failed).
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A server-side script failed to evaluate.
    #[error("script evaluation error: {0}")]
    Script(String),

    /// A stored value did not parse into its expected shape, e.g. a
    /// malformed `{refcount}:{sec.usec}` lock record.
    #[error("malformed stored value for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

impl StoreError {
    pub fn serialization(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Serialization {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
