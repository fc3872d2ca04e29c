//! Traits for the four host-provided primitives this crate treats as
//! external collaborators: a transactional key-value store, a named-lock
//! service, a broadcast channel, and a monotonic clock.
//!
//! [`mem`] provides a single-process, in-memory implementation of all four,
//! used by every test in this crate. The `browser` feature adds [`browser`],
//! backed by IndexedDB, Web Locks, and `BroadcastChannel`.

mod broadcast;
mod clock;
mod kv;
mod locks;

pub mod mem;

#[cfg(feature = "browser")]
pub mod browser;

pub use broadcast::{Broadcast, BroadcastReceiver, BroadcastSender};
pub use clock::{Clock, Instant};
pub use kv::{CommitWrite, Durability, KvStore, TxnPool};
pub use locks::{LockEntry, LockMode, LockOpts, LockQuery, NamedLocks};

/// Error raised by a host-collaborator trait implementation. Translated to a
/// `SqliteErr` at the facade boundary and stashed for
/// `jGetLastError`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HostError {
    #[error("host store unavailable: {0}")]
    Unavailable(String),
    #[error("host store transaction aborted: {0}")]
    TransactionAborted(String),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("lock acquisition timed out")]
    LockTimeout,
    #[error("broadcast channel closed")]
    ChannelClosed,
}
