//! A `SQLite` virtual file system that persists databases in IndexedDB and
//! coordinates multiple same-origin tabs/workers through cooperative named
//! locks and a broadcast channel.
//!
//! The FFI seam (`vfs`, `ffi`, `vars`, `flags`, `logger`) follows the same
//! shape as a conventional native `SQLite` VFS crate: a synchronous [`vfs::Vfs`]
//! trait that the raw `extern "C"` shims call directly, plus an
//! [`vfs::AsyncVfs`] trait and [`vfs::SuspendingVfs`] adapter for
//! implementations that must wait on the browser's storage and locking APIs.
//! Everything above that seam — the lock state machine, the page stores, the
//! host trait abstractions — is ordinary, testable Rust.

extern crate alloc;

pub mod vars;

mod ffi;

pub mod flags;
pub mod logger;
pub mod runtime;
pub mod vfs;

pub mod host;
pub mod idbvfs;
pub mod nojournal;
pub mod store;
pub mod vtab;
pub mod weblocks;

#[cfg(test)]
mod mock;

pub use ffi::sqlite3_api_routines;

#[cfg(test)]
mod tests {
    #[test]
    fn sanity() {
        // verify that we are linked against rusqlite in tests
        assert_eq!(
            unsafe { super::ffi::sqlite3_libversion_number() },
            rusqlite::version_number()
        );
    }
}
