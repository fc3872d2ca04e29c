//! Component H: the no-journal surrogate file.
//!
//! When SQLite opens a rollback journal (`{db}-journal`), the facade hands it
//! this type instead of persisting a real journal: rollback journals exist
//! so a crashed process can recover, which has no meaning in a store that
//! only ever sees fully-committed transactions. The surrogate plays along
//! with just enough of the journal file format that SQLite believes the
//! journal is complete and never actually replays it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::vars;
use crate::vfs::VfsResult;

/// Bytes 8..12 of a rollback-journal header hold the page count. SQLite
/// treats this sentinel as "journal format version not recognized, but the
/// header checksum matched" and discards the journal without reading
/// further — see the `aJournalMagic` handling in `sqlite3PagerSharedLock`.
const HOT_JOURNAL_PAGE_COUNT_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// What the surrogate needs from its sibling database `File` — kept as a
/// trait rather than a concrete type so this module doesn't depend on the
/// facade's main-file representation.
pub trait RollbackTarget: Send {
    fn set_rollback_oob(&mut self);
}

/// The facade's open-file table, indexed by path, that [`NoJournalFile`]
/// looks its companion database file up through on every access rather than
/// holding an owning reference to it.
pub struct OpenFileTable<F> {
    inner: Arc<Mutex<BTreeMap<String, Arc<Mutex<F>>>>>,
}

impl<F> Clone for OpenFileTable<F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<F> Default for OpenFileTable<F> {
    fn default() -> Self {
        Self { inner: Arc::new(Mutex::new(BTreeMap::new())) }
    }
}

impl<F> OpenFileTable<F> {
    pub fn register(&self, path: String, file: Arc<Mutex<F>>) {
        self.inner.lock().insert(path, file);
    }

    pub fn unregister(&self, path: &str) {
        self.inner.lock().remove(path);
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<Mutex<F>>> {
        self.inner.lock().get(path).cloned()
    }
}

/// One open journal file. Retains at most one page record; everything else
/// about its contents is manufactured on read.
pub struct NoJournalFile<F: RollbackTarget> {
    table: OpenFileTable<F>,
    db_path: String,
    data: Vec<u8>,
}

impl<F: RollbackTarget> NoJournalFile<F> {
    pub fn new(table: OpenFileTable<F>, db_path: String) -> Self {
        Self { table, db_path, data: Vec::new() }
    }

    /// `jWrite`: accepts the first page record written (header, sector,
    /// page, checksum); every write after that targets bytes already within
    /// the one retained record (a header rewrite, e.g. the final commit
    /// flag) or is silently discarded.
    pub fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        let offset = offset as usize;
        if self.data.is_empty() {
            if offset != 0 {
                return Ok(());
            }
            self.data = buf.to_vec();
            return Ok(());
        }
        if offset >= self.data.len() {
            return Ok(());
        }
        let end = (offset + buf.len()).min(self.data.len());
        let n = end - offset;
        self.data[offset..end].copy_from_slice(&buf[..n]);
        Ok(())
    }

    /// `jRead`: returns the retained bytes, patching in the hot-journal
    /// marker and flagging the sibling database file out-of-band whenever
    /// the read touches the page-count field.
    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        let offset = offset as usize;
        let avail = self.data.len().saturating_sub(offset);
        let n = buf.len().min(avail);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        let short = n < buf.len();
        if short {
            buf[n..].fill(0);
        }

        let read_end = offset + buf.len();
        if offset < 12 && read_end > 8 {
            let lo = 8usize.saturating_sub(offset);
            let hi = (12usize.saturating_sub(offset)).min(buf.len());
            if hi > lo {
                buf[lo..hi].copy_from_slice(&HOT_JOURNAL_PAGE_COUNT_MARKER[..hi - lo]);
            }
            if let Some(db) = self.table.lookup(&self.db_path) {
                db.lock().set_rollback_oob();
            }
        }

        if short {
            Err(vars::SQLITE_IOERR_SHORT_READ)
        } else {
            Ok(())
        }
    }

    /// `jTruncate`: `0` clears the retained record; anything else just caps it.
    pub fn truncate(&mut self, new_size: u64) -> VfsResult<()> {
        let new_size = new_size as usize;
        if new_size < self.data.len() {
            self.data.truncate(new_size);
        }
        Ok(())
    }

    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn device_characteristics() -> i32 {
        vars::SQLITE_IOCAP_SAFE_APPEND | vars::SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDb {
        rollback_oob: bool,
    }
    impl RollbackTarget for FakeDb {
        fn set_rollback_oob(&mut self) {
            self.rollback_oob = true;
        }
    }

    #[test]
    fn read_of_page_count_sets_hot_marker_and_flags_sibling() {
        let table: OpenFileTable<FakeDb> = OpenFileTable::default();
        let db = Arc::new(Mutex::new(FakeDb { rollback_oob: false }));
        table.register("db".into(), db.clone());

        let mut journal = NoJournalFile::new(table, "db".into());
        journal.write(&[0u8; 32], 0).unwrap();

        let mut buf = vec![0u8; 32];
        journal.read(&mut buf, 0).unwrap();
        assert_eq!(&buf[8..12], &HOT_JOURNAL_PAGE_COUNT_MARKER);
        assert!(db.lock().rollback_oob);
    }

    #[test]
    fn missing_sibling_is_a_no_op() {
        let table: OpenFileTable<FakeDb> = OpenFileTable::default();
        let mut journal = NoJournalFile::new(table, "gone".into());
        journal.write(&[0u8; 32], 0).unwrap();
        let mut buf = vec![0u8; 32];
        // sibling was never registered; reading must not panic.
        journal.read(&mut buf, 0).unwrap();
    }

    #[test]
    fn second_write_is_discarded_past_retained_record() {
        let table: OpenFileTable<FakeDb> = OpenFileTable::default();
        let mut journal = NoJournalFile::new(table, "db".into());
        journal.write(&[1u8; 16], 0).unwrap();
        journal.write(&[2u8; 16], 16).unwrap();
        assert_eq!(journal.file_size(), 16);
    }

    #[test]
    fn truncate_zero_clears() {
        let table: OpenFileTable<FakeDb> = OpenFileTable::default();
        let mut journal = NoJournalFile::new(table, "db".into());
        journal.write(&[1u8; 16], 0).unwrap();
        journal.truncate(0).unwrap();
        assert_eq!(journal.file_size(), 0);
    }
}
