//! Component D: the lock state machine that maps the five SQLite lock
//! levels onto a small set of process-wide named locks, so that multiple
//! tabs/workers negotiate file access the way multiple OS processes would
//! negotiate POSIX advisory locks.
//!
//! Built over [`crate::host::NamedLocks`] rather than directly over a
//! concrete lock backend, so the whole state machine is testable against
//! [`crate::host::mem::MemLocks`] without a browser.

use crate::flags::LockLevel;
use crate::host::{Clock, LockMode, LockOpts, NamedLocks};
use crate::vars;
use crate::vfs::{SqliteErr, VfsResult};

/// Selects which named-lock choreography guards a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockPolicy {
    /// Single owner, reader or writer; simplest and least concurrent.
    Exclusive,
    /// Multiple concurrent readers, single writer, writer can starve on
    /// another writer's RESERVED.
    Shared,
    /// Like `Shared`, but a writer claims a `hint` lock before entering
    /// SHARED so its later upgrade to RESERVED cannot deadlock against
    /// another writer doing the same.
    SharedHint,
}

fn busy<T>() -> VfsResult<T> {
    Err(vars::SQLITE_BUSY)
}

fn proto_error<T>() -> VfsResult<T> {
    Err(vars::SQLITE_ERROR)
}

/// Drives one file's lock level through `NONE < SHARED < RESERVED <
/// EXCLUSIVE` over an [`L: NamedLocks`] backend, for a single named path.
pub struct LockStateMachine<L: NamedLocks, C: Clock> {
    locks: L,
    clock: C,
    path: String,
    policy: LockPolicy,
    /// 0 disables the timeout (wait indefinitely), matching `lockTimeout`.
    timeout_ms: u64,
    state: LockLevel,
    /// Set by a prior `WRITE_HINT` file-control; consulted only under
    /// `SharedHint` to decide whether `NONE -> SHARED` must first claim `hint`.
    intends_write: bool,

    inner: Option<L::Guard>,
    hint: Option<L::Guard>,
    write: Option<L::Guard>,
    reserved: Option<L::Guard>,
}

impl<L: NamedLocks, C: Clock> LockStateMachine<L, C> {
    pub fn new(locks: L, clock: C, path: impl Into<String>, policy: LockPolicy, timeout_ms: u64) -> Self {
        Self {
            locks,
            clock,
            path: path.into(),
            policy,
            timeout_ms,
            state: LockLevel::Unlocked,
            intends_write: false,
            inner: None,
            hint: None,
            write: None,
            reserved: None,
        }
    }

    pub fn state(&self) -> LockLevel {
        self.state
    }

    /// Escape hatch for the page store to acquire/release the `{path}@@[N]`
    /// view lock directly — a lock name this state machine doesn't itself
    /// manage (it only owns the Outer/Inner/hint/write/reserved choreography).
    pub fn named_locks(&self) -> &L {
        &self.locks
    }

    /// Records a `WRITE_HINT` file-control: the next `NONE -> SHARED` will
    /// pre-claim `hint` under `SharedHint` so the later upgrade to RESERVED
    /// is deadlock-free.
    pub fn set_write_hint(&mut self) {
        self.intends_write = true;
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}@@{suffix}", self.path)
    }

    /// `{path}@@Outer` is purely the transition mutex that serializes
    /// concurrent `NONE -> SHARED` entrants; it is claimed exclusively and
    /// dropped again before that transition completes, and plays no part
    /// in reporting RESERVED.
    fn outer_name(&self) -> String {
        self.name("Outer")
    }
    fn inner_name(&self) -> String {
        self.name("Inner")
    }
    fn hint_name(&self) -> String {
        self.name("hint")
    }
    fn write_name(&self) -> String {
        self.name("write")
    }
    /// `{path}@@reserved`: held exclusively by whichever agent is at
    /// RESERVED or above, independent of `Outer`/`Inner`. `jCheckReservedLock`
    /// polls this name, not `Outer`, so a concurrent `NONE -> SHARED`
    /// entrant's brief exclusive hold on `Outer` never reads back as an
    /// in-progress RESERVED claim.
    fn reserved_name(&self) -> String {
        self.name("reserved")
    }

    async fn acquire(&self, name: &str, mode: LockMode, poll: bool) -> VfsResult<Option<L::Guard>> {
        let opts = LockOpts { poll, steal: false };
        if self.timeout_ms == 0 || poll {
            return self
                .locks
                .request(name, mode, opts)
                .await
                .map_err(|_| vars::SQLITE_IOERR);
        }
        let deadline = self.clock.now().as_millis() + self.timeout_ms;
        loop {
            if let Some(guard) = self
                .locks
                .request(name, mode, LockOpts { poll: true, steal: false })
                .await
                .map_err(|_| vars::SQLITE_IOERR)?
            {
                return Ok(Some(guard));
            }
            if self.clock.now().as_millis() >= deadline {
                return Ok(None);
            }
        }
    }

    /// `jLock`.
    pub async fn lock(&mut self, target: LockLevel) -> VfsResult<()> {
        if target == self.state {
            return Ok(());
        }
        match self.policy {
            LockPolicy::Exclusive => self.lock_exclusive_policy(target).await,
            LockPolicy::Shared | LockPolicy::SharedHint => self.lock_shared_policy(target).await,
        }
    }

    async fn lock_exclusive_policy(&mut self, target: LockLevel) -> VfsResult<()> {
        match (self.state, target) {
            (LockLevel::Unlocked, _) => {
                match self.acquire(&self.write_name(), LockMode::Exclusive, false).await? {
                    Some(guard) => {
                        self.write = Some(guard);
                        self.state = target;
                        Ok(())
                    }
                    None => busy(),
                }
            }
            // already hold the sole lock; any further escalation is free
            (_, _) if self.write.is_some() => {
                self.state = target;
                Ok(())
            }
            _ => proto_error(),
        }
    }

    async fn lock_shared_policy(&mut self, target: LockLevel) -> VfsResult<()> {
        match (self.state, target) {
            (LockLevel::Unlocked, LockLevel::Shared) => {
                if self.policy == LockPolicy::SharedHint && self.intends_write && self.hint.is_none() {
                    match self.acquire(&self.hint_name(), LockMode::Exclusive, true).await? {
                        Some(guard) => self.hint = Some(guard),
                        None => return busy(),
                    }
                }
                let Some(outer) = self.acquire(&self.outer_name(), LockMode::Exclusive, false).await? else {
                    return busy();
                };
                let inner = match self.acquire(&self.inner_name(), LockMode::Shared, false).await? {
                    Some(g) => g,
                    None => {
                        drop(outer);
                        return busy();
                    }
                };
                drop(outer);
                self.inner = Some(inner);
                self.state = LockLevel::Shared;
                Ok(())
            }
            (LockLevel::Shared, LockLevel::Reserved) => {
                if self.policy == LockPolicy::SharedHint && self.hint.is_none() {
                    // writer must have pre-claimed `hint` before entering SHARED
                    return proto_error();
                }
                match self.acquire(&self.reserved_name(), LockMode::Exclusive, false).await? {
                    Some(guard) => {
                        self.reserved = Some(guard);
                        self.state = LockLevel::Reserved;
                        Ok(())
                    }
                    None => busy(),
                }
            }
            (LockLevel::Reserved, LockLevel::Pending) => {
                self.state = LockLevel::Pending;
                Ok(())
            }
            (LockLevel::Reserved | LockLevel::Pending, LockLevel::Exclusive) => {
                let old_inner = self.inner.take();
                match self.acquire(&self.inner_name(), LockMode::Exclusive, false).await? {
                    Some(guard) => {
                        drop(old_inner);
                        self.inner = Some(guard);
                        self.state = LockLevel::Exclusive;
                        Ok(())
                    }
                    None => {
                        self.inner = old_inner;
                        busy()
                    }
                }
            }
            (LockLevel::Exclusive, LockLevel::Shared) => {
                let old_inner = self.inner.take();
                match self.acquire(&self.inner_name(), LockMode::Shared, false).await? {
                    Some(guard) => {
                        drop(old_inner);
                        self.inner = Some(guard);
                        self.reserved = None;
                        self.state = LockLevel::Shared;
                        Ok(())
                    }
                    None => {
                        self.inner = old_inner;
                        busy()
                    }
                }
            }
            _ => proto_error(),
        }
    }

    /// `jUnlock`.
    pub fn unlock(&mut self, target: LockLevel) -> VfsResult<()> {
        if target == self.state {
            return Ok(());
        }
        match self.policy {
            LockPolicy::Exclusive => {
                if target == LockLevel::Unlocked {
                    self.write = None;
                    self.state = LockLevel::Unlocked;
                    Ok(())
                } else if target < self.state {
                    self.state = target;
                    Ok(())
                } else {
                    proto_error()
                }
            }
            LockPolicy::Shared | LockPolicy::SharedHint => match (self.state, target) {
                (_, LockLevel::Unlocked) if self.state >= LockLevel::Reserved => {
                    self.inner = None;
                    self.hint = None;
                    self.reserved = None;
                    self.state = LockLevel::Unlocked;
                    Ok(())
                }
                (LockLevel::Shared, LockLevel::Unlocked) => {
                    self.inner = None;
                    self.state = LockLevel::Unlocked;
                    Ok(())
                }
                (_, _) if target < self.state => {
                    if target < LockLevel::Reserved {
                        self.reserved = None;
                    }
                    self.state = target;
                    Ok(())
                }
                _ => proto_error(),
            },
        }
    }

    /// `jCheckReservedLock`: non-destructively tests whether some other
    /// agent holds RESERVED or higher, by polling a shared claim on
    /// `reserved` and immediately releasing it.
    pub async fn check_reserved(&self) -> VfsResult<bool> {
        if self.state >= LockLevel::Reserved {
            return Ok(true);
        }
        match self
            .locks
            .request(&self.reserved_name(), LockMode::Shared, LockOpts { poll: true, steal: false })
            .await
        {
            Ok(Some(_guard)) => Ok(false),
            Ok(None) => Ok(true),
            Err(_) => Err(vars::SQLITE_IOERR as SqliteErr),
        }
    }

    /// Computes `oldestTxId` from the lock service's `query()`: the minimum
    /// trailing integer among `{path}@@[N]` locks held or pending by any
    /// agent, defaulting to `own_view_tx_id` when no other agent's view
    /// lock is visible.
    pub fn oldest_view_tx_id(&self, own_view_tx_id: u64) -> u64 {
        let prefix = self.name("[");
        let query = self.locks.query();
        query
            .held
            .into_iter()
            .chain(query.pending)
            .filter_map(|entry| {
                entry
                    .name
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(']'))
                    .and_then(|n| n.parse::<u64>().ok())
            })
            .min()
            .map(|min| min.min(own_view_tx_id))
            .unwrap_or(own_view_tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::{MemClock, MemLocks};

    fn machine(path: &str, policy: LockPolicy) -> LockStateMachine<MemLocks, MemClock> {
        LockStateMachine::new(MemLocks::new(), MemClock::new(), path, policy, 0)
    }

    /// `timeout_ms` of `0` means "wait indefinitely" for a blocking
    /// acquisition, so any test where the second machine contends with a
    /// lock the first machine never releases needs a real, small, positive
    /// timeout here — otherwise the blocking request just hangs the test.
    fn two_machines_with_timeout(
        path: &str,
        policy: LockPolicy,
        timeout_ms: u64,
    ) -> (LockStateMachine<MemLocks, MemClock>, LockStateMachine<MemLocks, MemClock>) {
        let locks = MemLocks::new();
        let clock = MemClock::new();
        (
            LockStateMachine::new(locks.clone(), clock.clone(), path, policy, timeout_ms),
            LockStateMachine::new(locks, clock, path, policy, timeout_ms),
        )
    }

    fn two_machines(path: &str, policy: LockPolicy) -> (LockStateMachine<MemLocks, MemClock>, LockStateMachine<MemLocks, MemClock>) {
        two_machines_with_timeout(path, policy, 0)
    }

    #[test]
    fn exclusive_policy_escalates_and_releases_freely() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::Exclusive);
            assert_eq!(a.state(), LockLevel::Unlocked);
            a.lock(LockLevel::Shared).await.unwrap();
            assert_eq!(a.state(), LockLevel::Shared);
            a.lock(LockLevel::Exclusive).await.unwrap();
            assert_eq!(a.state(), LockLevel::Exclusive);
            a.unlock(LockLevel::Unlocked).unwrap();
            assert_eq!(a.state(), LockLevel::Unlocked);
        });
    }

    #[test]
    fn exclusive_policy_second_agent_is_locked_out() {
        pollster::block_on(async {
            let (mut a, mut b) = two_machines_with_timeout("db", LockPolicy::Exclusive, 20);
            a.lock(LockLevel::Shared).await.unwrap();
            let err = b.lock(LockLevel::Shared).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_BUSY);
            a.unlock(LockLevel::Unlocked).unwrap();
            b.lock(LockLevel::Shared).await.unwrap();
            assert_eq!(b.state(), LockLevel::Shared);
        });
    }

    #[test]
    fn shared_policy_allows_concurrent_readers() {
        pollster::block_on(async {
            let (mut a, mut b) = two_machines("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            b.lock(LockLevel::Shared).await.unwrap();
            assert_eq!(a.state(), LockLevel::Shared);
            assert_eq!(b.state(), LockLevel::Shared);
        });
    }

    #[test]
    fn shared_policy_second_writer_is_busy_at_reserved() {
        pollster::block_on(async {
            let (mut a, mut b) = two_machines_with_timeout("db", LockPolicy::Shared, 20);
            a.lock(LockLevel::Shared).await.unwrap();
            b.lock(LockLevel::Shared).await.unwrap();
            a.lock(LockLevel::Reserved).await.unwrap();
            let err = b.lock(LockLevel::Reserved).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_BUSY);
        });
    }

    #[test]
    fn shared_policy_full_escalation_to_exclusive_and_back() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            a.lock(LockLevel::Reserved).await.unwrap();
            a.lock(LockLevel::Pending).await.unwrap();
            a.lock(LockLevel::Exclusive).await.unwrap();
            assert_eq!(a.state(), LockLevel::Exclusive);
            a.lock(LockLevel::Shared).await.unwrap();
            assert_eq!(a.state(), LockLevel::Shared);
            a.unlock(LockLevel::Unlocked).unwrap();
            assert_eq!(a.state(), LockLevel::Unlocked);
        });
    }

    #[test]
    fn shared_hint_policy_rejects_reserved_without_prior_hint() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::SharedHint);
            // no set_write_hint() call before entering SHARED
            a.lock(LockLevel::Shared).await.unwrap();
            let err = a.lock(LockLevel::Reserved).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_ERROR);
        });
    }

    #[test]
    fn shared_hint_policy_succeeds_when_hint_set_before_shared() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::SharedHint);
            a.set_write_hint();
            a.lock(LockLevel::Shared).await.unwrap();
            a.lock(LockLevel::Reserved).await.unwrap();
            assert_eq!(a.state(), LockLevel::Reserved);
        });
    }

    #[test]
    fn shared_hint_policy_two_writers_dont_deadlock_on_hint() {
        // Both writers claim `hint` (poll mode) before SHARED; the second
        // claimant's poll fails fast with BUSY instead of blocking forever
        // behind the first writer's later RESERVED upgrade.
        pollster::block_on(async {
            let (mut a, mut b) = two_machines("db", LockPolicy::SharedHint);
            a.set_write_hint();
            b.set_write_hint();
            a.lock(LockLevel::Shared).await.unwrap();
            let err = b.lock(LockLevel::Shared).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_BUSY);
        });
    }

    #[test]
    fn unlock_is_a_noop_at_current_level() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            a.unlock(LockLevel::Shared).unwrap();
            assert_eq!(a.state(), LockLevel::Shared);
        });
    }

    #[test]
    fn unlock_from_reserved_drops_straight_to_unlocked() {
        pollster::block_on(async {
            let mut a = machine("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            a.lock(LockLevel::Reserved).await.unwrap();
            a.unlock(LockLevel::Unlocked).unwrap();
            assert_eq!(a.state(), LockLevel::Unlocked);
        });
    }

    #[test]
    fn check_reserved_sees_other_agents_reserved_hold() {
        pollster::block_on(async {
            let (mut a, b) = two_machines("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            a.lock(LockLevel::Reserved).await.unwrap();
            assert!(b.check_reserved().await.unwrap());
        });
    }

    #[test]
    fn check_reserved_is_false_with_no_reserved_holder() {
        pollster::block_on(async {
            let (mut a, b) = two_machines("db", LockPolicy::Shared);
            a.lock(LockLevel::Shared).await.unwrap();
            assert!(!b.check_reserved().await.unwrap());
        });
    }

    #[test]
    fn oldest_view_tx_id_defaults_to_own_when_no_view_locks_held() {
        let a = machine("db", LockPolicy::Shared);
        assert_eq!(a.oldest_view_tx_id(7), 7);
    }

    #[test]
    fn oldest_view_tx_id_picks_the_minimum_across_agents() {
        pollster::block_on(async {
            let locks = MemLocks::new();
            let clock = MemClock::new();
            let a = LockStateMachine::new(locks.clone(), clock.clone(), "db", LockPolicy::Shared, 0);
            // simulate two sibling view-lock holders by claiming the raw
            // `{path}@@[N]` names directly through the shared NamedLocks
            // backend, the same way BatchAtomicFile does.
            let _g1 = locks
                .request("db@@[3]", LockMode::Shared, LockOpts::default())
                .await
                .unwrap()
                .unwrap();
            let _g2 = locks
                .request("db@@[5]", LockMode::Shared, LockOpts::default())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(a.oldest_view_tx_id(10), 3);
        });
    }
}
