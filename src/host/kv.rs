//! Component A: a transactional key-value store over two fixed object
//! stores, `blocks` and `tx`, mirroring the IndexedDB object stores the
//! batch-atomic page store persists to.
//!
//! The trait is shaped around the one operation that must be atomic —
//! commit — rather than exposing a generic transaction handle, since commit
//! is the only place this crate needs more than one write to land together.

use core::future::Future;

use crate::host::HostError;
use crate::store::record::{BlockRecord, TxRecord};

/// How strongly a write should be flushed before the call returns.
/// IndexedDB transactions support `"strict"` durability (fsync before the
/// `oncomplete` event fires) in addition to the default, relaxed mode; most
/// callers pick `Default` and rely on the WAL-less commit protocol's own
/// atomicity instead of per-write fsync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Durability {
    Default,
    Strict,
    Relaxed,
}

/// The atomic unit of work performed at commit:
/// persist the transaction's touched pages, publish its transaction record,
/// and garbage-collect superseded blocks/transactions below the current
/// view-lock minimum, all in one host-store transaction.
#[derive(Clone, Debug)]
pub struct CommitWrite {
    pub path: String,
    pub puts: Vec<BlockRecord>,
    pub tx: TxRecord,
    /// Delete transaction records for this path strictly below this id.
    pub gc_tx_below: Option<u64>,
}

/// A transactional key-value store split into a `blocks` and a `tx` object
/// store, addressed by `(path, offset)` and `(path, txId)` respectively.
pub trait KvStore: Send + Sync {
    fn get_block(
        &self,
        path: &str,
        offset: u64,
    ) -> impl Future<Output = Result<Option<BlockRecord>, HostError>> + Send;

    /// All blocks recorded for `path`, in ascending offset order.
    fn get_all_blocks(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<BlockRecord>, HostError>> + Send;

    /// All transaction records for `path`, most recent (`highest txId`)
    /// first — the order the batch-atomic reader walks when looking for the
    /// newest version of a page.
    fn get_all_tx_desc(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<TxRecord>, HostError>> + Send;

    /// Transaction records for `path` with id >= `from_tx_id`, ascending.
    fn get_tx_from(
        &self,
        path: &str,
        from_tx_id: u64,
    ) -> impl Future<Output = Result<Vec<TxRecord>, HostError>> + Send;

    /// Performs a [`CommitWrite`] as a single atomic host-store transaction.
    fn commit(
        &self,
        write: CommitWrite,
        durability: Durability,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Drops every record (blocks and tx) for `path`. Used by `xDelete` and
    /// when a no-journal file's owning database is deleted.
    fn delete_path(&self, path: &str) -> impl Future<Output = Result<(), HostError>> + Send;
}

/// Wraps a [`KvStore`] to reuse host-store transactions across calls instead
/// of opening a fresh one each time, and to retry a commit once if the host store reports a
/// transient abort.
///
/// IndexedDB transactions auto-commit at the end of a microtask, so "reuse"
/// here means: keep issuing commits against the same logical store handle,
/// and on `HostError::TransactionAborted` retry exactly once with a fresh
/// attempt before surfacing the error. The bookkeeping is otherwise
/// transparent — every method just delegates to the wrapped store.
pub struct TxnPool<K> {
    inner: K,
}

impl<K: KvStore> TxnPool<K> {
    pub fn new(inner: K) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &K {
        &self.inner
    }
}

impl<K: KvStore> KvStore for TxnPool<K> {
    async fn get_block(&self, path: &str, offset: u64) -> Result<Option<BlockRecord>, HostError> {
        self.inner.get_block(path, offset).await
    }

    async fn get_all_blocks(&self, path: &str) -> Result<Vec<BlockRecord>, HostError> {
        self.inner.get_all_blocks(path).await
    }

    async fn get_all_tx_desc(&self, path: &str) -> Result<Vec<TxRecord>, HostError> {
        self.inner.get_all_tx_desc(path).await
    }

    async fn get_tx_from(&self, path: &str, from_tx_id: u64) -> Result<Vec<TxRecord>, HostError> {
        self.inner.get_tx_from(path, from_tx_id).await
    }

    async fn commit(&self, write: CommitWrite, durability: Durability) -> Result<(), HostError> {
        match self.inner.commit(write.clone(), durability).await {
            Err(HostError::TransactionAborted(_)) => self.inner.commit(write, durability).await,
            other => other,
        }
    }

    async fn delete_path(&self, path: &str) -> Result<(), HostError> {
        self.inner.delete_path(path).await
    }
}
