//! Component F: the simplified IDBMinimal store, valid only for callers
//! that keep two invariants (journal mode `TRUNCATE`, and the contract
//! documented on [`IdbMinimalStore`]) in exchange for not needing the
//! batch-atomic store's transaction/view-lock machinery at all.

use std::collections::BTreeMap;

use crate::host::{Durability, HostError, KvStore};
use crate::store::record::BlockRecord;
use crate::vars;
use crate::vfs::VfsResult;

fn host_err<T>(_e: HostError) -> VfsResult<T> {
    Err(vars::SQLITE_IOERR)
}

/// Blocks are keyed by `(path, -offset)` so a "last block" lookup is a
/// prefix range query instead of a full scan — negating the offset puts
/// the highest offset first in ascending key order.
fn minimal_key(offset: u64) -> u64 {
    u64::MAX - offset
}

/// A simplified page store with two invariants imposed on the caller:
/// overlapping writes reuse the same `(offset, size)`, and every read is
/// fully contained in exactly one prior write. Valid for a main DB using
/// journal mode `TRUNCATE`; neither invariant is enforced at runtime
/// unless [`strict`](Self::new) is set.
pub struct IdbMinimalStore<K: KvStore> {
    kv: K,
    path: String,
    file_size: u64,
    /// Remembers each offset's write length so `strict` mode can detect a
    /// caller reusing an offset with a different length.
    written_lengths: BTreeMap<u64, usize>,
    strict: bool,
    durability: Durability,
}

async fn scan<K: KvStore>(kv: &K, path: &str) -> VfsResult<(BTreeMap<u64, usize>, u64)> {
    let blocks = match kv.get_all_blocks(path).await {
        Ok(b) => b,
        Err(e) => return host_err(e),
    };
    let mut written_lengths = BTreeMap::new();
    let mut file_size = 0u64;
    for b in &blocks {
        let offset = u64::MAX - b.offset;
        written_lengths.insert(offset, b.data.len());
        file_size = file_size.max(offset + b.data.len() as u64);
    }
    Ok((written_lengths, file_size))
}

impl<K: KvStore> IdbMinimalStore<K> {
    pub async fn open(kv: K, path: impl Into<String>, strict: bool) -> VfsResult<Self> {
        let path = path.into();
        let (written_lengths, file_size) = scan(&kv, &path).await?;
        Ok(Self {
            kv,
            path,
            file_size,
            written_lengths,
            strict,
            durability: Durability::Default,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Re-derives `file_size` (and, under `strict`, the written-length map)
    /// from the store on `NONE -> SHARED`: another agent
    /// may have grown the file since this store last looked.
    pub async fn refresh_file_size(&mut self) -> VfsResult<()> {
        let (written_lengths, file_size) = scan(&self.kv, &self.path).await?;
        self.written_lengths = written_lengths;
        self.file_size = file_size;
        Ok(())
    }

    /// `jRead`: a single range query at `-offset`.
    pub async fn read(&self, buf: &mut [u8], offset: u64) -> VfsResult<()> {
        if self.strict {
            if let Some(&len) = self.written_lengths.get(&offset) {
                if len != buf.len() {
                    return Err(vars::SQLITE_MISUSE);
                }
            } else {
                // straddles two writes, or reads unwritten space
                return Err(vars::SQLITE_MISUSE);
            }
        }
        match self.kv.get_block(&self.path, minimal_key(offset)).await {
            Ok(Some(block)) => {
                let n = buf.len().min(block.data.len());
                buf[..n].copy_from_slice(&block.data[..n]);
                if n < buf.len() {
                    buf[n..].fill(0);
                    return Err(vars::SQLITE_IOERR_SHORT_READ);
                }
                Ok(())
            }
            Ok(None) => {
                buf.fill(0);
                Err(vars::SQLITE_IOERR_SHORT_READ)
            }
            Err(e) => host_err(e),
        }
    }

    /// `jWrite`: caller invariant is "overlapping writes use an identical
    /// (offset, size)".
    pub async fn write(&mut self, buf: &[u8], offset: u64) -> VfsResult<()> {
        if self.strict {
            if let Some(&prev_len) = self.written_lengths.get(&offset) {
                if prev_len != buf.len() {
                    return Err(vars::SQLITE_MISUSE);
                }
            }
        }
        let record = BlockRecord {
            path: self.path.clone(),
            offset: minimal_key(offset),
            data: buf.to_vec(),
        };
        if let Err(e) = self
            .kv
            .commit(
                crate::host::CommitWrite {
                    path: self.path.clone(),
                    puts: vec![record],
                    tx: crate::store::record::TxRecord::empty(self.path.clone(), 0, 0),
                    gc_tx_below: None,
                },
                self.durability,
            )
            .await
        {
            return host_err(e);
        }
        self.written_lengths.insert(offset, buf.len());
        self.file_size = self.file_size.max(offset + buf.len() as u64);
        Ok(())
    }

    pub fn set_durability(&mut self, durability: Durability) {
        self.durability = durability;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::MemKv;

    #[test]
    fn write_then_read_back_round_trips() {
        pollster::block_on(async {
            let mut store = IdbMinimalStore::open(MemKv::new(), "db", true).await.unwrap();
            store.write(&[0x42; 4096], 0).await.unwrap();
            assert_eq!(store.file_size(), 4096);

            let mut buf = vec![0u8; 4096];
            store.read(&mut buf, 0).await.unwrap();
            assert_eq!(buf, vec![0x42; 4096]);
        });
    }

    #[test]
    fn read_of_unwritten_offset_is_zero_padded_short_read() {
        pollster::block_on(async {
            let store = IdbMinimalStore::open(MemKv::new(), "db", false).await.unwrap();
            let mut buf = vec![0xFFu8; 512];
            let err = store.read(&mut buf, 0).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_IOERR_SHORT_READ);
            assert_eq!(buf, vec![0u8; 512]);
        });
    }

    #[test]
    fn strict_mode_rejects_a_length_mismatched_rewrite() {
        pollster::block_on(async {
            let mut store = IdbMinimalStore::open(MemKv::new(), "db", true).await.unwrap();
            store.write(&[0x11; 4096], 0).await.unwrap();
            let err = store.write(&[0x22; 2048], 0).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_MISUSE);
        });
    }

    #[test]
    fn strict_mode_rejects_a_read_that_straddles_writes() {
        pollster::block_on(async {
            let mut store = IdbMinimalStore::open(MemKv::new(), "db", true).await.unwrap();
            store.write(&[0x11; 4096], 0).await.unwrap();
            store.write(&[0x22; 4096], 4096).await.unwrap();
            let mut buf = vec![0u8; 8192];
            let err = store.read(&mut buf, 0).await.unwrap_err();
            assert_eq!(err, vars::SQLITE_MISUSE);
        });
    }

    #[test]
    fn non_strict_mode_tolerates_a_length_mismatched_rewrite() {
        pollster::block_on(async {
            let mut store = IdbMinimalStore::open(MemKv::new(), "db", false).await.unwrap();
            store.write(&[0x11; 4096], 0).await.unwrap();
            store.write(&[0x22; 2048], 0).await.unwrap();
            let mut buf = vec![0u8; 2048];
            store.read(&mut buf, 0).await.unwrap();
            assert_eq!(buf, vec![0x22; 2048]);
        });
    }

    #[test]
    fn refresh_file_size_picks_up_blocks_written_by_another_handle() {
        pollster::block_on(async {
            let kv = MemKv::new();
            let mut store = IdbMinimalStore::open(kv.clone(), "db", true).await.unwrap();
            assert_eq!(store.file_size(), 0);

            let mut other = IdbMinimalStore::open(kv, "db", true).await.unwrap();
            other.write(&[0x33; 4096], 4096).await.unwrap();

            store.refresh_file_size().await.unwrap();
            assert_eq!(store.file_size(), 8192);
            let mut buf = vec![0u8; 4096];
            store.read(&mut buf, 4096).await.unwrap();
            assert_eq!(buf, vec![0x33; 4096]);
        });
    }
}
