//! Data model shared by both page stores.
//!
//! A transaction's touched-page set is a `BTreeSet<u64>` rather than a map
//! from offset to an unused `null` value, since Rust has an actual set
//! type. `BTreeSet`/`BTreeMap` are
//! used throughout this module (rather than the hash-based equivalents) so
//! that iterating a page set or a block map comes out in ascending-offset
//! order for free, which both the commit GC pass and the minimal store's
//! reverse scan rely on.

use std::collections::BTreeSet;

/// One page as persisted in the `blocks` object store, keyed by
/// `(path, offset)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub path: String,
    pub offset: u64,
    pub data: Vec<u8>,
}

/// One committed transaction as persisted in the `tx` object store, keyed
/// by `(path, txId)`. `pages` records which offsets this transaction wrote
/// without needing to re-read their data; `file_size` is the database's
/// logical size immediately after this transaction applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRecord {
    pub path: String,
    pub tx_id: u64,
    pub pages: BTreeSet<u64>,
    pub file_size: u64,
}

impl TxRecord {
    pub fn empty(path: impl Into<String>, tx_id: u64, file_size: u64) -> Self {
        Self {
            path: path.into(),
            tx_id,
            pages: BTreeSet::new(),
            file_size,
        }
    }
}
