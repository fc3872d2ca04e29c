// cargo build --example memvfs_idb --features dynamic
//
// Native dynamic-extension entry point for [`idb_sqlite_vfs::idbvfs::IdbVfs`].
// Unlike a browser build, this demo wires the facade to the in-memory host
// backends (`host::mem`) rather than IndexedDB/Web Locks/BroadcastChannel,
// so it doubles as a way to load-test the facade's async/suspend path
// through `sqlite3`'s ordinary extension-loading mechanism without a
// browser at all.

use std::{ffi::c_void, os::raw::c_char};

use idb_sqlite_vfs::{
    host::mem::{MemBroadcast, MemClock, MemKv, MemLocks},
    idbvfs::{IdbVfs, VfsConfig},
    runtime::NativeRuntime,
    sqlite3_api_routines, vars,
    vfs::{RegisterOpts, register_async_dynamic},
    weblocks::LockPolicy,
};

/// This function is called by `SQLite` when the extension is loaded. It
/// registers an `IdbVfs` backed by the in-memory reference host
/// (`host::mem`) under the name `idb`.
/// # Safety
/// This function should only be called by sqlite's extension loading mechanism.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sqlite3_memvfsidb_init(
    _db: *mut c_void,
    _pz_err_msg: *mut *mut c_char,
    p_api: *mut sqlite3_api_routines,
) -> std::os::raw::c_int {
    let vfs = IdbVfs::new(
        MemKv::new(),
        MemBroadcast::new(),
        MemLocks::new(),
        MemClock::new(),
        VfsConfig { lock_policy: LockPolicy::SharedHint, ..Default::default() },
    );

    if let Err(err) = unsafe {
        register_async_dynamic(p_api, "idb", vfs, NativeRuntime, RegisterOpts { make_default: true })
    } {
        return err;
    }

    log::set_max_level(log::LevelFilter::Trace);

    vars::SQLITE_OK_LOAD_PERMANENTLY
}
