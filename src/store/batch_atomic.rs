//! Component G: the primary page store — a paged database file layered over
//! [`KvStore`], with per-transaction atomicity, a view-lock-gated read
//! snapshot, and a broadcast mirror that propagates committed transactions
//! to sibling agents.

use std::collections::BTreeMap;

use crate::flags::LockLevel;
use crate::host::{
    Broadcast, BroadcastReceiver, BroadcastSender, Clock, CommitWrite, Durability, HostError,
    KvStore, LockMode, LockOpts, NamedLocks, TxnPool,
};
use crate::store::record::{BlockRecord, TxRecord};
use crate::vars;
use crate::vfs::VfsResult;
use crate::weblocks::{LockPolicy, LockStateMachine};

fn host_err<T>(_e: HostError) -> VfsResult<T> {
    Err(vars::SQLITE_IOERR)
}

/// A transaction's pending writes, not yet committed. `pages` holds full
/// page data (unlike the persisted `TxRecord`, whose `pages` is an offset
/// set — the full bytes already live in the mirror once merged at commit).
#[derive(Clone, Debug, Default)]
struct TxActive {
    tx_id: u64,
    pages: BTreeMap<u64, Vec<u8>>,
    file_size: u64,
}

/// Payload mirrored on `mirror:{path}` when a transaction commits: unlike
/// the persisted `TxRecord`, this carries full page bytes so a receiving
/// agent can apply it without a round trip back to the host store.
#[derive(Clone, Debug)]
pub struct TxPayload {
    pub tx_id: u64,
    pub pages: BTreeMap<u64, Vec<u8>>,
    pub file_size: u64,
}

impl TxPayload {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.pages.len() * 16);
        out.extend_from_slice(&self.tx_id.to_le_bytes());
        out.extend_from_slice(&self.file_size.to_le_bytes());
        out.extend_from_slice(&(self.pages.len() as u64).to_le_bytes());
        for (offset, data) in &self.pages {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        let mut pos = 0usize;
        let mut take = |n: usize| -> Option<&[u8]> {
            let s = buf.get(pos..pos + n)?;
            pos += n;
            Some(s)
        };
        let tx_id = u64::from_le_bytes(take(8)?.try_into().ok()?);
        let file_size = u64::from_le_bytes(take(8)?.try_into().ok()?);
        let count = u64::from_le_bytes(take(8)?.try_into().ok()?);
        let mut pages = BTreeMap::new();
        for _ in 0..count {
            let offset = u64::from_le_bytes(take(8)?.try_into().ok()?);
            let len = u64::from_le_bytes(take(8)?.try_into().ok()?) as usize;
            let data = take(len)?.to_vec();
            pages.insert(offset, data);
        }
        Some(Self { tx_id, pages, file_size })
    }
}

fn view_lock_name(path: &str, tx_id: u64) -> String {
    format!("{path}@@[{tx_id}]")
}

/// One open main-DB file: in-memory block mirror, the transaction the
/// mirror currently reflects (`view_tx_id`), any pending write transaction,
/// and the queue of not-yet-applied peer commits.
pub struct BatchAtomicFile<K: KvStore, B: Broadcast, L: NamedLocks, C: Clock> {
    path: String,
    block_size: u64,
    mirror: BTreeMap<u64, Vec<u8>>,
    view_tx_id: u64,
    view_guard: Option<L::Guard>,
    active: Option<TxActive>,
    /// Set by `OVERWRITE`; defers commit to `COMMIT_PHASETWO` during VACUUM.
    overwrite_in_progress: bool,
    write_durability: Durability,
    synchronous_full: bool,

    kv: TxnPool<K>,
    sender: B::Sender,
    receiver: B::Receiver,
    pending_peer_commits: Vec<TxPayload>,

    locks: LockStateMachine<L, C>,
}

impl<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock> BatchAtomicFile<K, B, L, C> {
    /// `jOpen` for a main DB.
    pub async fn open(
        kv: K,
        broadcast: &B,
        locks: L,
        clock: C,
        path: impl Into<String>,
        create: bool,
        policy: LockPolicy,
        timeout_ms: u64,
    ) -> VfsResult<Self> {
        let path = path.into();

        let mut all_blocks = match kv.get_all_blocks(&path).await {
            Ok(b) => b,
            Err(e) => return host_err(e),
        };
        if !all_blocks.iter().any(|b| b.offset == 0) {
            if !create {
                return Err(vars::SQLITE_CANTOPEN);
            }
            // persist an empty block 0 and a matching empty transaction
            // record so a subsequent open() of this path without CREATE
            // observes the file as already existing.
            let block = BlockRecord { path: path.clone(), offset: 0, data: Vec::new() };
            let write = CommitWrite {
                path: path.clone(),
                puts: vec![block.clone()],
                tx: TxRecord::empty(path.clone(), 0, 0),
                gc_tx_below: None,
            };
            if let Err(e) = kv.commit(write, Durability::Default).await {
                return host_err(e);
            }
            all_blocks.push(block);
        }

        let mut mirror = BTreeMap::new();
        for b in all_blocks {
            mirror.insert(b.offset, b.data);
        }
        let block_size = mirror.get(&0).map(|b| b.len() as u64).unwrap_or(0);

        let tx_desc = match kv.get_all_tx_desc(&path).await {
            Ok(t) => t,
            Err(e) => return host_err(e),
        };
        let view_tx_id = tx_desc.first().map(|t| t.tx_id).unwrap_or(0);

        let (sender, receiver) = broadcast.open(&format!("mirror:{path}"));

        let mut file_locks =
            LockStateMachine::new(locks.clone(), clock, path.clone(), policy, timeout_ms);
        file_locks.lock(LockLevel::Shared).await?;

        // hold `{path}@@[viewTx.txId]` in shared mode for as long as this
        // view is current.
        let view_guard = locks
            .request(&view_lock_name(&path, view_tx_id), LockMode::Shared, LockOpts::default())
            .await
            .map_err(|_| vars::SQLITE_IOERR)?;

        Ok(Self {
            path,
            block_size,
            mirror,
            view_tx_id,
            view_guard,
            active: None,
            overwrite_in_progress: false,
            write_durability: Durability::Default,
            synchronous_full: true,
            kv: TxnPool::new(kv),
            sender,
            receiver,
            pending_peer_commits: Vec::new(),
            locks: file_locks,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.active
            .as_ref()
            .map(|a| a.file_size)
            .unwrap_or(self.mirror.len() as u64 * self.block_size)
    }

    /// `jRead`: overlays `active`'s pending pages over the committed mirror.
    pub fn read(&self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        let file_size = self.file_size();
        let mut remaining = buf.len() as u64;
        let mut pos = offset;
        let mut out_pos = 0usize;
        let mut short = false;

        while remaining > 0 {
            if pos >= file_size {
                short = true;
                break;
            }
            let block_idx = pos / self.block_size.max(1);
            let block_off = pos % self.block_size.max(1);
            let page = self
                .active
                .as_ref()
                .and_then(|a| a.pages.get(&block_idx))
                .or_else(|| self.mirror.get(&block_idx));
            let take = (self.block_size - block_off).min(remaining) as usize;
            match page {
                Some(data) => {
                    let avail = data.len().saturating_sub(block_off as usize);
                    let n = take.min(avail);
                    buf[out_pos..out_pos + n]
                        .copy_from_slice(&data[block_off as usize..block_off as usize + n]);
                    if n < take {
                        short = true;
                    }
                }
                None => short = true,
            }
            out_pos += take;
            pos += take as u64;
            remaining -= take as u64;
        }

        if short {
            buf[out_pos..].fill(0);
            return Err(vars::SQLITE_IOERR_SHORT_READ);
        }
        Ok(())
    }

    fn ensure_active(&mut self) {
        if self.active.is_none() {
            self.active = Some(TxActive {
                tx_id: self.view_tx_id + 1,
                pages: BTreeMap::new(),
                file_size: self.mirror.len() as u64 * self.block_size.max(1),
            });
        }
    }

    /// `jWrite` on the main DB: requires RESERVED or higher (auto-opens
    /// `active` on first write after entering RESERVED).
    pub fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        if self.block_size == 0 {
            self.block_size = buf.len() as u64;
        }
        self.ensure_active();
        let active = self.active.as_mut().unwrap();

        let block_idx = offset / self.block_size;
        let existing = active
            .pages
            .get(&block_idx)
            .cloned()
            .or_else(|| self.mirror.get(&block_idx).cloned());
        let mut page = existing.unwrap_or_else(|| vec![0u8; self.block_size as usize]);
        let block_off = (offset % self.block_size) as usize;
        if page.len() < block_off + buf.len() {
            page.resize(block_off + buf.len(), 0);
        }
        page[block_off..block_off + buf.len()].copy_from_slice(buf);
        active.pages.insert(block_idx, page);

        let end = offset + buf.len() as u64;
        if end > active.file_size {
            active.file_size = end;
        }
        Ok(())
    }

    /// `jTruncate`: lowers the active transaction's logical size; obsolete
    /// blocks are dropped at commit time, not here.
    pub fn truncate(&mut self, new_size: u64) -> VfsResult<()> {
        self.ensure_active();
        self.active.as_mut().unwrap().file_size = new_size;
        Ok(())
    }

    /// `ROLLBACK_ATOMIC_WRITE`.
    pub fn rollback(&mut self) {
        self.active = None;
    }

    pub fn begin_overwrite(&mut self) {
        self.overwrite_in_progress = true;
    }

    /// `jSync` / `COMMIT_ATOMIC_WRITE` when not mid-VACUUM.
    pub async fn sync(&mut self) -> VfsResult<()> {
        if self.overwrite_in_progress {
            return Ok(());
        }
        self.commit().await
    }

    /// `COMMIT_PHASETWO`: concludes a deferred VACUUM commit.
    pub async fn commit_phase_two(&mut self) -> VfsResult<()> {
        self.overwrite_in_progress = false;
        self.commit().await
    }

    async fn commit(&mut self) -> VfsResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        // 1. merge active pages into the mirror, shrink to active.file_size
        for (offset, data) in &active.pages {
            self.mirror.insert(*offset, data.clone());
        }
        let live_blocks = (active.file_size / self.block_size.max(1)).max(1);
        self.mirror.retain(|&offset, _| offset < live_blocks);

        // 2. publish the new view lock, then release the old one
        let new_guard = self
            .locks
            .named_locks()
            .request(
                &view_lock_name(&self.path, active.tx_id),
                LockMode::Shared,
                LockOpts::default(),
            )
            .await
            .map_err(|_| vars::SQLITE_IOERR)?;
        let old_guard = self.view_guard.take();
        self.view_guard = new_guard;
        drop(old_guard);

        // 3. oldestTxId from other agents' view locks
        let oldest = self.locks.oldest_view_tx_id(active.tx_id);

        // 4+5. persist pages and the stripped transaction record, GC old tx
        let puts: Vec<BlockRecord> = active
            .pages
            .iter()
            .map(|(&offset, data)| BlockRecord {
                path: self.path.clone(),
                offset,
                data: data.clone(),
            })
            .collect();
        let tx_record = TxRecord {
            path: self.path.clone(),
            tx_id: active.tx_id,
            pages: active.pages.keys().copied().collect(),
            file_size: active.file_size,
        };
        let write = CommitWrite {
            path: self.path.clone(),
            puts,
            tx: tx_record,
            gc_tx_below: Some(oldest),
        };
        if let Err(e) = self.kv.commit(write, self.write_durability).await {
            self.active = Some(active);
            return host_err(e);
        }

        self.view_tx_id = active.tx_id;

        // 6. broadcast the full payload (with page data) to sibling agents
        let payload = TxPayload {
            tx_id: active.tx_id,
            pages: active.pages,
            file_size: active.file_size,
        };
        let send = self.sender.send(payload.encode());
        if self.synchronous_full {
            let _ = send.await;
        }
        Ok(())
    }

    /// `jLock`. On `SHARED -> RESERVED`, checks for a stale view (spec
    /// "Upgrading to RESERVED with stale view") before granting locally.
    pub async fn lock(&mut self, target: LockLevel) -> VfsResult<()> {
        if target == LockLevel::Reserved && self.locks.state() == LockLevel::Shared {
            let fresh = match self.kv.get_tx_from(&self.path, self.view_tx_id).await {
                Ok(t) => t,
                Err(e) => return host_err(e),
            };
            let stale = fresh.iter().any(|t| t.tx_id > self.view_tx_id);
            if stale {
                for tx in fresh {
                    if tx.tx_id <= self.view_tx_id {
                        continue;
                    }
                    let mut pages = BTreeMap::new();
                    for offset in &tx.pages {
                        if let Ok(Some(block)) = self.kv.get_block(&self.path, *offset).await {
                            pages.insert(*offset, block.data);
                        }
                    }
                    self.pending_peer_commits.push(TxPayload {
                        tx_id: tx.tx_id,
                        pages,
                        file_size: tx.file_size,
                    });
                }
                return Err(vars::SQLITE_BUSY);
            }
        }
        self.locks.lock(target).await
    }

    pub fn unlock(&mut self, target: LockLevel) -> VfsResult<()> {
        let result = self.locks.unlock(target);
        if matches!(target, LockLevel::Unlocked | LockLevel::Shared) {
            self.drain_broadcast();
            self.incorporate_peer_commits();
        }
        result
    }

    pub async fn check_reserved_lock(&self) -> VfsResult<bool> {
        self.locks.check_reserved().await
    }

    /// Non-blocking drain of the broadcast receiver into `pending_peer_commits`.
    fn drain_broadcast(&mut self) {
        while let Some(bytes) = self.receiver.try_recv() {
            if let Some(payload) = TxPayload::decode(&bytes) {
                self.pending_peer_commits.push(payload);
            }
        }
    }

    /// Applies strictly-next queued peer transactions in order (spec
    /// "Incorporating peers' commits"); a message whose `txId` leaves a gap
    /// is left queued until the missing transaction arrives.
    fn incorporate_peer_commits(&mut self) {
        self.pending_peer_commits.sort_by_key(|p| p.tx_id);
        loop {
            let Some(next) = self.pending_peer_commits.first() else {
                break;
            };
            if next.tx_id != self.view_tx_id + 1 {
                break;
            }
            let next = self.pending_peer_commits.remove(0);
            for (offset, data) in &next.pages {
                self.mirror.insert(*offset, data.clone());
            }
            let live_blocks = (next.file_size / self.block_size.max(1)).max(1);
            self.mirror.retain(|&offset, _| offset < live_blocks);
            self.view_tx_id = next.tx_id;
        }
    }

    pub fn device_characteristics(&self) -> i32 {
        vars::SQLITE_IOCAP_BATCH_ATOMIC | vars::SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN
    }

    pub fn sector_size(&self) -> i32 {
        (self.block_size as i32).max(vars::SQLITE_DEFAULT_SECTOR_SIZE)
    }

    pub fn set_synchronous_full(&mut self, full: bool) {
        self.synchronous_full = full;
    }

    /// `WRITE_HINT` file-control: forwarded to the internal lock state
    /// machine so a subsequent `NONE -> SHARED` under `SharedHint` pre-claims
    /// the hint lock.
    pub fn set_write_hint(&mut self) {
        self.locks.set_write_hint();
    }

    pub fn set_durability(&mut self, durability: Durability) {
        self.write_durability = durability;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::{MemBroadcast, MemClock, MemKv, MemLocks};

    fn block(path: &str, offset: u64, byte: u8, len: usize) -> BlockRecord {
        BlockRecord { path: path.into(), offset, data: vec![byte; len] }
    }

    #[test]
    fn write_sync_reopen_roundtrip() {
        pollster::block_on(async {
            let kv = MemKv::new();
            let bc = MemBroadcast::new();
            let locks = MemLocks::new();
            let clock = MemClock::new();

            // seed page 0 so the file "exists"
            kv.commit(
                CommitWrite {
                    path: "db".into(),
                    puts: vec![block("db", 0, 0, 4096)],
                    tx: TxRecord::empty("db", 0, 4096),
                    gc_tx_below: None,
                },
                Durability::Default,
            )
            .await
            .unwrap();

            let mut file = BatchAtomicFile::open(
                kv.clone(),
                &bc,
                locks.clone(),
                clock.clone(),
                "db",
                true,
                LockPolicy::Shared,
                0,
            )
            .await
            .unwrap();

            file.lock(LockLevel::Shared).await.unwrap();
            file.lock(LockLevel::Reserved).await.unwrap();
            file.write(&[0x5A; 4096], 0).unwrap();
            file.sync().await.unwrap();
            file.unlock(LockLevel::Unlocked).unwrap();

            let mut buf = vec![0u8; 4096];
            file.read(&mut buf, 0).unwrap();
            assert_eq!(buf, vec![0x5A; 4096]);

            let reopened = BatchAtomicFile::open(
                kv, &bc, locks, clock, "db", false, LockPolicy::Shared, 0,
            )
            .await
            .unwrap();
            let mut buf = vec![0u8; 4096];
            reopened.read(&mut buf, 0).unwrap();
            assert_eq!(buf, vec![0x5A; 4096]);
        });
    }

    #[test]
    fn short_read_is_zero_padded() {
        pollster::block_on(async {
            let kv = MemKv::new();
            let bc = MemBroadcast::new();
            let locks = MemLocks::new();
            let clock = MemClock::new();
            kv.commit(
                CommitWrite {
                    path: "db".into(),
                    puts: vec![block("db", 0, 0x11, 1024)],
                    tx: TxRecord::empty("db", 0, 1024),
                    gc_tx_below: None,
                },
                Durability::Default,
            )
            .await
            .unwrap();

            let file = BatchAtomicFile::open(kv, &bc, locks, clock, "db", true, LockPolicy::Shared, 0)
                .await
                .unwrap();
            let mut buf = vec![0xFFu8; 2048];
            let err = file.read(&mut buf, 0).unwrap_err();
            assert_eq!(err, vars::SQLITE_IOERR_SHORT_READ);
            assert_eq!(&buf[..1024], &[0x11u8; 1024][..]);
            assert_eq!(&buf[1024..], &[0u8; 1024][..]);
        });
    }
}
