//! The two IndexedDB-backed page stores: [`batch_atomic`]
//! is the primary store used by ordinary database files, with
//! per-transaction atomicity and cross-agent mirroring; [`minimal`] is a
//! simpler append-oriented variant for files that don't need either.

pub mod batch_atomic;
pub mod minimal;
pub mod record;
