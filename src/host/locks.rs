//! Component B: a named-lock service modeled on the Web Locks API
//! (`navigator.locks`) — shared/exclusive locks identified by name, with
//! `ifAvailable` (poll) and `steal` request modes and a way to list every
//! lock currently held or queued.

use core::future::Future;

use crate::host::HostError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Request options mirroring `LockOptions` from the Web Locks API.
#[derive(Clone, Copy, Debug, Default)]
pub struct LockOpts {
    /// Don't wait: resolve immediately with `None` if the lock is not free.
    pub poll: bool,
    /// Forcibly take the lock, releasing any existing holders of the same
    /// name. Used by the lock-state machine to break a previous tab's
    /// abandoned exclusive hold.
    pub steal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockEntry {
    pub name: String,
    pub mode: LockMode,
}

/// Snapshot returned by [`NamedLocks::query`], split into held and queued
/// requests the way `navigator.locks.query()` reports them.
#[derive(Clone, Debug, Default)]
pub struct LockQuery {
    pub held: Vec<LockEntry>,
    pub pending: Vec<LockEntry>,
}

/// A guard representing one held lock. Dropping it releases the lock.
/// Release is synchronous (`Drop` cannot be async) — acquiring a contested
/// lock may need to wait, but giving one up is always a cheap local update.
pub trait NamedLocks: Send + Sync {
    type Guard: Send;

    fn request(
        &self,
        name: &str,
        mode: LockMode,
        opts: LockOpts,
    ) -> impl Future<Output = Result<Option<Self::Guard>, HostError>> + Send;

    fn query(&self) -> LockQuery;
}
