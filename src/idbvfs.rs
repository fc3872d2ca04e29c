//! Component E: the facade VFS that ties the lock state machine (D), the two
//! page stores (F, G), and the no-journal surrogate (H) into one
//! [`crate::vfs::AsyncVfs`] implementation — the thing a consumer actually
//! registers with [`crate::vfs::register_async_static`].
//!
//! Everything above the four host traits (`K`, `B`, `L`, `C`) is ordinary
//! Rust; swapping them for [`crate::host::browser`]'s IndexedDB/Web-Locks/
//! BroadcastChannel implementations is the only change needed to run this
//! facade in a browser.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::flags::{AccessFlags, LockLevel, OpenKind, OpenOpts};
use crate::host::{Broadcast, Clock, Durability, KvStore, NamedLocks};
use crate::logger::SqliteLogger;
use crate::nojournal::{NoJournalFile, OpenFileTable, RollbackTarget};
use crate::store::batch_atomic::BatchAtomicFile;
use crate::store::minimal::IdbMinimalStore;
use crate::vars;
use crate::vfs::{AsyncVfs, Pragma, PragmaErr, VfsHandle, VfsResult};
use crate::weblocks::{LockPolicy, LockStateMachine};

/// `synchronous = extra` is accepted and treated as `full`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    Full,
    Normal,
}

impl SyncMode {
    fn is_full(self) -> bool {
        matches!(self, SyncMode::Full)
    }
}

/// The environment/config options, threaded through to the lock
/// state machine and the stores at `open` time rather than read from the
/// environment — mirroring how [`crate::vfs::RegisterOpts`] is a plain
/// struct passed at registration.
#[derive(Clone, Debug)]
pub struct VfsConfig {
    pub lock_policy: LockPolicy,
    /// 0 disables the timeout (wait indefinitely).
    pub lock_timeout_ms: u64,
    pub durability: Durability,
    pub synchronous: SyncMode,
    /// Use the simplified `IdbMinimalStore` (F) instead of the batch-atomic
    /// store (G) for main DB files. Only valid for callers that keep
    /// journal mode `TRUNCATE` and `IdbMinimalStore`'s write contract
    /// — off by default since the batch-atomic store handles
    /// the general case.
    pub use_minimal_store: bool,
    /// Enforce `IdbMinimalStore`'s caller invariants at runtime instead of
    /// trusting them; off by default, since trusting the caller is the
    /// cheaper default.
    pub strict_minimal_invariants: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::Shared,
            lock_timeout_ms: 0,
            durability: Durability::Default,
            synchronous: SyncMode::Full,
            use_minimal_store: false,
            strict_minimal_invariants: false,
        }
    }
}

fn host_not_found<T>() -> VfsResult<T> {
    Err(vars::SQLITE_CANTOPEN)
}

enum MainStore<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> {
    BatchAtomic(BatchAtomicFile<K, B, L, C>),
    Minimal { store: IdbMinimalStore<K>, locks: LockStateMachine<L, C> },
}

/// One open main-database file. Held behind `Arc<Mutex<_>>` and registered in [`OpenFileTable`]
/// so a sibling [`NoJournalFile`] can reach it without owning it.
pub struct MainFile<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> {
    store: MainStore<K, B, L, C>,
    readonly: bool,
    synchronous_full: bool,
    /// Mirrors whichever lock state machine is active; `BatchAtomicFile`
    /// doesn't expose its own lock level, so this file tracks it directly
    /// from the result of its own `lock`/`unlock` calls.
    current_lock: LockLevel,
    /// Set by the no-journal surrogate when it notices a hot-journal read
    ///: the next time this file releases EXCLUSIVE, it bumps
    /// page 1's change counter so the engine discards its page cache
    /// instead of replaying a journal that was never written.
    rollback_oob: bool,
}

impl<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> RollbackTarget
    for MainFile<K, B, L, C>
{
    fn set_rollback_oob(&mut self) {
        self.rollback_oob = true;
    }
}

impl<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> MainFile<K, B, L, C> {
    fn file_size(&self) -> u64 {
        match &self.store {
            MainStore::BatchAtomic(f) => f.file_size(),
            MainStore::Minimal { store, .. } => store.file_size(),
        }
    }

    async fn read_async(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        match &self.store {
            MainStore::BatchAtomic(f) => f.read(buf, offset),
            MainStore::Minimal { store, .. } => store.read(buf, offset).await,
        }
    }

    async fn write_async(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        match &mut self.store {
            MainStore::BatchAtomic(f) => f.write(buf, offset),
            MainStore::Minimal { store, .. } => store.write(buf, offset).await,
        }
    }

    async fn truncate(&mut self, new_size: u64) -> VfsResult<()> {
        match &mut self.store {
            MainStore::BatchAtomic(f) => f.truncate(new_size),
            // IdbMinimalStore never shrinks (journal mode TRUNCATE keeps the
            // caller's offsets stable); a truncate to the current size is a
            // no-op, anything else is outside the store's contract.
            MainStore::Minimal { store, .. } => {
                if new_size == store.file_size() {
                    Ok(())
                } else {
                    Err(vars::SQLITE_IOERR_TRUNCATE)
                }
            }
        }
    }

    async fn lock(&mut self, target: LockLevel) -> VfsResult<()> {
        let from = self.current_lock;
        match &mut self.store {
            MainStore::BatchAtomic(f) => f.lock(target).await?,
            MainStore::Minimal { store, locks } => {
                locks.lock(target).await?;
                if from == LockLevel::Unlocked && target == LockLevel::Shared {
                    store.refresh_file_size().await?;
                }
            }
        }
        self.current_lock = target;
        Ok(())
    }

    fn unlock(&mut self, target: LockLevel) -> VfsResult<()> {
        let prior = self.current_lock;
        let result = match &mut self.store {
            MainStore::BatchAtomic(f) => f.unlock(target),
            MainStore::Minimal { locks, .. } => locks.unlock(target),
        };
        if result.is_ok() {
            self.current_lock = target;
            if prior == LockLevel::Exclusive && target != LockLevel::Exclusive {
                self.apply_rollback_oob();
            }
        }
        result
    }

    /// Patches page 1's change counter (offset 24, big-endian per the file
    /// format) directly in the committed mirror, bypassing the normal
    /// commit path: this is a cache-invalidation signal to the engine, not
    /// a durable write.
    fn apply_rollback_oob(&mut self) {
        if !self.rollback_oob {
            return;
        }
        self.rollback_oob = false;
        if let MainStore::BatchAtomic(f) = &mut self.store {
            let mut page1 = vec![0u8; 28];
            if f.read(&mut page1, 0).is_err() && page1.iter().all(|&b| b == 0) {
                return;
            }
            let counter = u32::from_be_bytes(page1[24..28].try_into().unwrap());
            let bumped = counter.wrapping_add(1).to_be_bytes();
            let _ = f.write(&bumped, 24);
        }
    }

    async fn check_reserved_lock(&self) -> VfsResult<bool> {
        match &self.store {
            MainStore::BatchAtomic(f) => f.check_reserved_lock().await,
            MainStore::Minimal { locks, .. } => locks.check_reserved().await,
        }
    }

    async fn sync(&mut self) -> VfsResult<()> {
        match &mut self.store {
            MainStore::BatchAtomic(f) => f.sync().await,
            MainStore::Minimal { .. } => Ok(()),
        }
    }

    fn device_characteristics(&self) -> i32 {
        match &self.store {
            MainStore::BatchAtomic(f) => f.device_characteristics(),
            MainStore::Minimal { .. } => {
                vars::SQLITE_IOCAP_SAFE_APPEND | vars::SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN
            }
        }
    }

    fn sector_size(&self) -> i32 {
        match &self.store {
            MainStore::BatchAtomic(f) => f.sector_size(),
            MainStore::Minimal { .. } => crate::vars::SQLITE_DEFAULT_SECTOR_SIZE,
        }
    }

    async fn file_control(&mut self, op: i32) -> VfsResult<()> {
        let MainStore::BatchAtomic(f) = &mut self.store else {
            return Err(vars::SQLITE_NOTFOUND);
        };
        match op {
            vars::SQLITE_FCNTL_BEGIN_ATOMIC_WRITE => Ok(()),
            vars::SQLITE_FCNTL_COMMIT_ATOMIC_WRITE | vars::SQLITE_FCNTL_SYNC => f.sync().await,
            vars::SQLITE_FCNTL_ROLLBACK_ATOMIC_WRITE => {
                f.rollback();
                Ok(())
            }
            vars::SQLITE_FCNTL_OVERWRITE => {
                f.begin_overwrite();
                Ok(())
            }
            vars::SQLITE_FCNTL_COMMIT_PHASETWO => f.commit_phase_two().await,
            _ => Err(vars::SQLITE_NOTFOUND),
        }
    }

    fn pragma(&mut self, pragma: Pragma<'_>) -> Result<Option<String>, PragmaErr> {
        match pragma.name {
            "page_size" => Ok(None),
            "synchronous" => {
                if let Some(arg) = pragma.arg {
                    self.synchronous_full = !arg.eq_ignore_ascii_case("normal");
                    if let MainStore::BatchAtomic(f) = &mut self.store {
                        f.set_synchronous_full(self.synchronous_full);
                    }
                }
                Ok(Some(if self.synchronous_full { "full".into() } else { "normal".into() }))
            }
            _ => Err(PragmaErr::NotFound),
        }
    }
}

/// A transient or temp file: a simple in-memory byte buffer with no
/// durability, locking, or cross-agent visibility.
#[derive(Default)]
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    fn read(&self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        let offset = offset as usize;
        let avail = self.data.len().saturating_sub(offset);
        let n = buf.len().min(avail);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        if n < buf.len() {
            buf[n..].fill(0);
            Err(vars::SQLITE_IOERR_SHORT_READ)
        } else {
            Ok(())
        }
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        let offset = offset as usize;
        if self.data.len() < offset + buf.len() {
            self.data.resize(offset + buf.len(), 0);
        }
        self.data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> VfsResult<()> {
        self.data.resize(new_size as usize, 0);
        Ok(())
    }
}

pub enum IdbHandle<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> {
    Main { path: String, file: Arc<Mutex<MainFile<K, B, L, C>>> },
    Journal { file: NoJournalFile<MainFile<K, B, L, C>> },
    Memory { file: MemoryFile, readonly: bool },
}

impl<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> VfsHandle
    for IdbHandle<K, B, L, C>
{
    fn readonly(&self) -> bool {
        match self {
            IdbHandle::Main { file, .. } => file.lock().readonly,
            IdbHandle::Journal { .. } => false,
            IdbHandle::Memory { readonly, .. } => *readonly,
        }
    }

    fn in_memory(&self) -> bool {
        matches!(self, IdbHandle::Memory { .. })
    }
}

/// The facade itself: owns the shared host collaborators and the open-file
/// table, and dispatches every `jFoo` to the right component by
/// [`OpenKind`].
pub struct IdbVfs<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> {
    kv: K,
    broadcast: B,
    locks: L,
    clock: C,
    config: VfsConfig,
    table: OpenFileTable<MainFile<K, B, L, C>>,
}

impl<K: KvStore, B: Broadcast, L: NamedLocks + Clone, C: Clock + Clone> IdbVfs<K, B, L, C> {
    pub fn new(kv: K, broadcast: B, locks: L, clock: C, config: VfsConfig) -> Self {
        Self { kv, broadcast, locks, clock, config, table: OpenFileTable::default() }
    }
}

/// Bridges `jLog`/`xLog` to the `log` facade crate — every component above
/// the FFI seam logs through `log::debug!`/`log::trace!` rather than
/// holding its own `SqliteLogger`.
struct LogCompat {
    logger: Mutex<SqliteLogger>,
}

impl log::Log for LogCompat {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let level = match record.level() {
            log::Level::Error => crate::logger::SqliteLogLevel::Error,
            log::Level::Warn => crate::logger::SqliteLogLevel::Warn,
            _ => crate::logger::SqliteLogLevel::Notice,
        };
        let msg = std::format!("{}", record.args());
        self.logger.lock().log(level, &msg);
    }

    fn flush(&self) {}
}

fn strip_journal_suffix(path: &str) -> String {
    path.strip_suffix("-journal").unwrap_or(path).to_string()
}

impl<K, B, L, C> AsyncVfs for IdbVfs<K, B, L, C>
where
    K: KvStore + Clone + 'static,
    B: Broadcast + 'static,
    L: NamedLocks + Clone + 'static,
    C: Clock + Clone + 'static,
{
    type Handle = IdbHandle<K, B, L, C>;

    fn register_logger(&self, logger: SqliteLogger) {
        let compat = LogCompat { logger: Mutex::new(logger) };
        let _ = log::set_boxed_logger(std::boxed::Box::new(compat));
    }

    async fn open(&self, path: Option<&str>, opts: OpenOpts) -> VfsResult<Self::Handle> {
        log::debug!("open: path={path:?} opts={opts:?}");
        match opts.kind() {
            OpenKind::MainDb => {
                let Some(path) = path else { return host_not_found() };
                let path = path.to_string();
                let create = opts.flags() & vars::SQLITE_OPEN_CREATE != 0;
                let readonly = opts.mode().is_readonly();

                let store = if self.config.use_minimal_store {
                    let store = IdbMinimalStore::open(
                        self.kv.clone(),
                        path.clone(),
                        self.config.strict_minimal_invariants,
                    )
                    .await?;
                    let locks = LockStateMachine::new(
                        self.locks.clone(),
                        self.clock.clone(),
                        path.clone(),
                        self.config.lock_policy,
                        self.config.lock_timeout_ms,
                    );
                    MainStore::Minimal { store, locks }
                } else {
                    let file = BatchAtomicFile::open(
                        self.kv.clone(),
                        &self.broadcast,
                        self.locks.clone(),
                        self.clock.clone(),
                        path.clone(),
                        create,
                        self.config.lock_policy,
                        self.config.lock_timeout_ms,
                    )
                    .await?;
                    MainStore::BatchAtomic(file)
                };

                let file = Arc::new(Mutex::new(MainFile {
                    store,
                    readonly,
                    synchronous_full: self.config.synchronous.is_full(),
                    current_lock: LockLevel::Unlocked,
                    rollback_oob: false,
                }));
                self.table.register(path.clone(), file.clone());
                Ok(IdbHandle::Main { path, file })
            }
            OpenKind::MainJournal => {
                let db_path = strip_journal_suffix(path.unwrap_or_default());
                Ok(IdbHandle::Journal {
                    file: NoJournalFile::new(self.table.clone(), db_path),
                })
            }
            _ => Ok(IdbHandle::Memory {
                file: MemoryFile::default(),
                readonly: opts.mode().is_readonly(),
            }),
        }
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        self.log(std::format_args!("delete: path={path:?}"));
        self.kv.delete_path(path).await.map_err(|_| vars::SQLITE_IOERR_DELETE)
    }

    async fn access(&self, path: &str, flags: AccessFlags) -> VfsResult<bool> {
        self.log(std::format_args!("access: path={path:?} flags={flags:?}"));
        if self.table.lookup(path).is_some() {
            return Ok(true);
        }
        match self.kv.get_all_blocks(path).await {
            Ok(blocks) => Ok(!blocks.is_empty()),
            Err(_) => Ok(false),
        }
    }

    async fn file_size(&self, handle: &mut Self::Handle) -> VfsResult<usize> {
        let size = match handle {
            IdbHandle::Main { file, .. } => file.lock().file_size(),
            IdbHandle::Journal { file } => file.file_size(),
            IdbHandle::Memory { file, .. } => file.data.len() as u64,
        };
        size.try_into().map_err(|_| vars::SQLITE_IOERR_FSTAT)
    }

    async fn truncate(&self, handle: &mut Self::Handle, size: usize) -> VfsResult<()> {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().truncate(size as u64).await,
            IdbHandle::Journal { file } => file.truncate(size as u64),
            IdbHandle::Memory { file, .. } => file.truncate(size as u64),
        }
    }

    async fn write(&self, handle: &mut Self::Handle, offset: usize, data: &[u8]) -> VfsResult<usize> {
        match handle {
            IdbHandle::Main { file, .. } => {
                file.lock().write_async(data, offset as u64).await?;
            }
            IdbHandle::Journal { file } => file.write(data, offset as u64)?,
            IdbHandle::Memory { file, .. } => file.write(data, offset as u64)?,
        }
        Ok(data.len())
    }

    async fn read(&self, handle: &mut Self::Handle, offset: usize, data: &mut [u8]) -> VfsResult<usize> {
        match handle {
            IdbHandle::Main { file, .. } => {
                file.lock().read_async(data, offset as u64).await?;
            }
            IdbHandle::Journal { file } => file.read(data, offset as u64)?,
            IdbHandle::Memory { file, .. } => file.read(data, offset as u64)?,
        }
        Ok(data.len())
    }

    async fn lock(&self, handle: &mut Self::Handle, level: LockLevel) -> VfsResult<()> {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().lock(level).await,
            _ => Ok(()),
        }
    }

    async fn unlock(&self, handle: &mut Self::Handle, level: LockLevel) -> VfsResult<()> {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().unlock(level),
            _ => Ok(()),
        }
    }

    async fn check_reserved_lock(&self, handle: &mut Self::Handle) -> VfsResult<bool> {
        match handle {
            IdbHandle::Main { file, .. } => {
                let f = file.lock();
                f.check_reserved_lock().await
            }
            _ => Ok(false),
        }
    }

    async fn sync(&self, handle: &mut Self::Handle) -> VfsResult<()> {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().sync().await,
            _ => Ok(()),
        }
    }

    async fn close(&self, handle: Self::Handle) -> VfsResult<()> {
        if let IdbHandle::Main { path, .. } = &handle {
            self.table.unregister(path);
        }
        Ok(())
    }

    async fn pragma(
        &self,
        handle: &mut Self::Handle,
        pragma: Pragma<'_>,
    ) -> Result<Option<String>, PragmaErr> {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().pragma(pragma),
            _ => Err(PragmaErr::NotFound),
        }
    }

    async fn file_control(&self, handle: &mut Self::Handle, op: i32) -> VfsResult<()> {
        match handle {
            IdbHandle::Main { file, .. } => {
                if op == vars::SQLITE_FCNTL_WRITE_HINT {
                    match &mut file.lock().store {
                        MainStore::Minimal { locks, .. } => locks.set_write_hint(),
                        MainStore::BatchAtomic(f) => f.set_write_hint(),
                    }
                    return Ok(());
                }
                let mut f = file.lock();
                f.file_control(op).await
            }
            _ => Err(vars::SQLITE_NOTFOUND),
        }
    }

    fn sector_size(&self, handle: &mut Self::Handle) -> i32 {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().sector_size(),
            IdbHandle::Journal { .. } | IdbHandle::Memory { .. } => vars::SQLITE_DEFAULT_SECTOR_SIZE,
        }
    }

    fn device_characteristics(&self, handle: &mut Self::Handle) -> i32 {
        match handle {
            IdbHandle::Main { file, .. } => file.lock().device_characteristics(),
            IdbHandle::Journal { .. } => NoJournalFile::<MainFile<K, B, L, C>>::device_characteristics(),
            IdbHandle::Memory { .. } => {
                vars::SQLITE_IOCAP_SAFE_APPEND | vars::SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN
            }
        }
    }
}
