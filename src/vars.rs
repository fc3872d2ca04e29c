//! `SQLite` result codes, open flags, lock levels, file-control opcodes and
//! device-characteristics bits used at the FFI boundary.
//!
//! This crate hand-transcribes the subset it needs directly: there is no
//! vendored amalgamation header in this tree to point `bindgen` at, and
//! every value below is part of `SQLite`'s long-stable public C ABI
//! (see <https://sqlite.org/c3ref/constlist.html>), so transcribing them is
//! not a guess.

#![allow(non_upper_case_globals)]
#![allow(unused)]

pub type SqliteErr = i32;

// result codes
pub const SQLITE_OK: i32 = 0;
pub const SQLITE_ERROR: i32 = 1;
pub const SQLITE_INTERNAL: i32 = 2;
pub const SQLITE_PERM: i32 = 3;
pub const SQLITE_ABORT: i32 = 4;
pub const SQLITE_BUSY: i32 = 5;
pub const SQLITE_LOCKED: i32 = 6;
pub const SQLITE_NOMEM: i32 = 7;
pub const SQLITE_READONLY: i32 = 8;
pub const SQLITE_IOERR: i32 = 10;
pub const SQLITE_CORRUPT: i32 = 11;
pub const SQLITE_NOTFOUND: i32 = 12;
pub const SQLITE_FULL: i32 = 13;
pub const SQLITE_CANTOPEN: i32 = 14;
pub const SQLITE_MISUSE: i32 = 21;
pub const SQLITE_NOTICE: i32 = 27;
pub const SQLITE_WARNING: i32 = 28;
pub const SQLITE_OK_LOAD_PERMANENTLY: i32 = SQLITE_OK | (1 << 8);

// extended IO error codes
pub const SQLITE_IOERR_READ: i32 = SQLITE_IOERR | (1 << 8);
pub const SQLITE_IOERR_SHORT_READ: i32 = SQLITE_IOERR | (2 << 8);
pub const SQLITE_IOERR_WRITE: i32 = SQLITE_IOERR | (3 << 8);
pub const SQLITE_IOERR_FSYNC: i32 = SQLITE_IOERR | (4 << 8);
pub const SQLITE_IOERR_FSTAT: i32 = SQLITE_IOERR | (7 << 8);
pub const SQLITE_IOERR_DELETE: i32 = SQLITE_IOERR | (9 << 8);
pub const SQLITE_IOERR_ACCESS: i32 = SQLITE_IOERR | (11 << 8);
pub const SQLITE_IOERR_TRUNCATE: i32 = SQLITE_IOERR | (15 << 8);
pub const SQLITE_IOERR_DELETE_NOENT: i32 = SQLITE_IOERR | (23 << 8);

// open flags
pub const SQLITE_OPEN_READONLY: i32 = 0x0000_0001;
pub const SQLITE_OPEN_READWRITE: i32 = 0x0000_0002;
pub const SQLITE_OPEN_CREATE: i32 = 0x0000_0004;
pub const SQLITE_OPEN_DELETEONCLOSE: i32 = 0x0000_0008;
pub const SQLITE_OPEN_EXCLUSIVE: i32 = 0x0000_0010;
pub const SQLITE_OPEN_AUTOPROXY: i32 = 0x0000_0020;
pub const SQLITE_OPEN_MAIN_DB: i32 = 0x0000_0100;
pub const SQLITE_OPEN_TEMP_DB: i32 = 0x0000_0200;
pub const SQLITE_OPEN_TRANSIENT_DB: i32 = 0x0000_0400;
pub const SQLITE_OPEN_MAIN_JOURNAL: i32 = 0x0000_0800;
pub const SQLITE_OPEN_TEMP_JOURNAL: i32 = 0x0000_1000;
pub const SQLITE_OPEN_SUBJOURNAL: i32 = 0x0000_2000;
pub const SQLITE_OPEN_SUPER_JOURNAL: i32 = 0x0000_4000;
pub const SQLITE_OPEN_NOMUTEX: i32 = 0x0000_8000;
pub const SQLITE_OPEN_FULLMUTEX: i32 = 0x0001_0000;
pub const SQLITE_OPEN_SHAREDCACHE: i32 = 0x0002_0000;
pub const SQLITE_OPEN_PRIVATECACHE: i32 = 0x0004_0000;
pub const SQLITE_OPEN_WAL: i32 = 0x0008_0000;
pub const SQLITE_OPEN_MEMORY: i32 = 0x0000_0080;

// access flags
pub const SQLITE_ACCESS_EXISTS: i32 = 0;
pub const SQLITE_ACCESS_READWRITE: i32 = 1;
pub const SQLITE_ACCESS_READ: i32 = 2;

// lock levels
pub const SQLITE_LOCK_NONE: i32 = 0;
pub const SQLITE_LOCK_SHARED: i32 = 1;
pub const SQLITE_LOCK_RESERVED: i32 = 2;
pub const SQLITE_LOCK_PENDING: i32 = 3;
pub const SQLITE_LOCK_EXCLUSIVE: i32 = 4;

// device characteristics (xDeviceCharacteristics bitmask)
pub const SQLITE_IOCAP_ATOMIC: i32 = 0x0000_0001;
pub const SQLITE_IOCAP_ATOMIC512: i32 = 0x0000_0002;
pub const SQLITE_IOCAP_ATOMIC4K: i32 = 0x0000_0010;
pub const SQLITE_IOCAP_SAFE_APPEND: i32 = 0x0000_0200;
pub const SQLITE_IOCAP_SEQUENTIAL: i32 = 0x0000_0400;
pub const SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN: i32 = 0x0000_0800;
pub const SQLITE_IOCAP_POWERSAFE_OVERWRITE: i32 = 0x0000_1000;
pub const SQLITE_IOCAP_IMMUTABLE: i32 = 0x0000_2000;
pub const SQLITE_IOCAP_BATCH_ATOMIC: i32 = 0x0000_4000;

// sqlite3_file_control opcodes
pub const SQLITE_FCNTL_BEGIN_ATOMIC_WRITE: i32 = 31;
pub const SQLITE_FCNTL_COMMIT_ATOMIC_WRITE: i32 = 32;
pub const SQLITE_FCNTL_ROLLBACK_ATOMIC_WRITE: i32 = 33;
pub const SQLITE_FCNTL_SYNC: i32 = 21;
pub const SQLITE_FCNTL_COMMIT_PHASETWO: i32 = 22;
pub const SQLITE_FCNTL_PRAGMA: i32 = 14;
pub const SQLITE_FCNTL_OVERWRITE: i32 = 11;
/// Implementation-defined: not part of `SQLite`'s reserved opcode range
/// (`SQLITE_FCNTL_*` above 100 is explicitly reserved for application use,
/// see the "pager sqlite3.h" comment above `SQLITE_FCNTL_VFSNAME`).
pub const SQLITE_FCNTL_WRITE_HINT: i32 = 500;

pub const SQLITE_DEFAULT_SECTOR_SIZE: i32 = 4096;

// fundamental datatypes (sqlite3_value_type)
pub const SQLITE_INTEGER: i32 = 1;
pub const SQLITE_NULL: i32 = 5;
