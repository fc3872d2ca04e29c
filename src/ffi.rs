//! Hand-written FFI surface for the subset of `SQLite`'s C API this crate
//! needs: `sqlite3_vfs`, `sqlite3_file`, `sqlite3_io_methods`, and the
//! `sqlite3_api_routines` table used when loaded as a runtime extension.
//!
//! This tree has no vendored amalgamation header to hand `bindgen`, so the
//! struct layouts below are transcribed by hand from `SQLite`'s public,
//! version-stable ABI instead (the `iVersion`
//! fields on `sqlite3_vfs`/`sqlite3_io_methods` exist precisely so that this
//! kind of hand/out-of-band binding stays forward compatible).
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unused)]

use core::ffi::{c_char, c_int, c_void};

pub type sqlite3_int64 = i64;
pub type sqlite_int64 = i64;
/// `zName` argument to `xOpen`/`xDelete`/`xAccess`: either a UTF-8,
/// NUL-terminated path, or null for an anonymous/transient file.
pub type sqlite3_filename = *const c_char;

#[repr(C)]
pub struct sqlite3_file {
    pub pMethods: *const sqlite3_io_methods,
}

#[repr(C)]
pub struct sqlite3_io_methods {
    pub iVersion: c_int,
    pub xClose: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file) -> c_int>,
    pub xRead: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            arg2: *mut c_void,
            iAmt: c_int,
            iOfst: sqlite3_int64,
        ) -> c_int,
    >,
    pub xWrite: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            arg2: *const c_void,
            iAmt: c_int,
            iOfst: sqlite3_int64,
        ) -> c_int,
    >,
    pub xTruncate:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, size: sqlite3_int64) -> c_int>,
    pub xSync: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, flags: c_int) -> c_int>,
    pub xFileSize:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, pSize: *mut sqlite3_int64) -> c_int>,
    pub xLock: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, arg2: c_int) -> c_int>,
    pub xUnlock: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, arg2: c_int) -> c_int>,
    pub xCheckReservedLock:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, pResOut: *mut c_int) -> c_int>,
    pub xFileControl: Option<
        unsafe extern "C" fn(arg1: *mut sqlite3_file, op: c_int, pArg: *mut c_void) -> c_int,
    >,
    pub xSectorSize: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file) -> c_int>,
    pub xDeviceCharacteristics: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file) -> c_int>,
    pub xShmMap: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            iPg: c_int,
            pgsz: c_int,
            arg2: c_int,
            arg3: *mut *mut c_void,
        ) -> c_int,
    >,
    pub xShmLock: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            offset: c_int,
            n: c_int,
            flags: c_int,
        ) -> c_int,
    >,
    pub xShmBarrier: Option<unsafe extern "C" fn(arg1: *mut sqlite3_file)>,
    pub xShmUnmap:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_file, deleteFlag: c_int) -> c_int>,
    pub xFetch: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            iOfst: sqlite3_int64,
            iAmt: c_int,
            pp: *mut *mut c_void,
        ) -> c_int,
    >,
    pub xUnfetch: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_file,
            iOfst: sqlite3_int64,
            p: *mut c_void,
        ) -> c_int,
    >,
}

#[repr(C)]
pub struct sqlite3_vfs {
    pub iVersion: c_int,
    pub szOsFile: c_int,
    pub mxPathname: c_int,
    pub pNext: *mut sqlite3_vfs,
    pub zName: *const c_char,
    pub pAppData: *mut c_void,
    pub xOpen: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: sqlite3_filename,
            arg2: *mut sqlite3_file,
            flags: c_int,
            pOutFlags: *mut c_int,
        ) -> c_int,
    >,
    pub xDelete: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: sqlite3_filename,
            syncDir: c_int,
        ) -> c_int,
    >,
    pub xAccess: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: sqlite3_filename,
            flags: c_int,
            pResOut: *mut c_int,
        ) -> c_int,
    >,
    pub xFullPathname: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: sqlite3_filename,
            nOut: c_int,
            zOut: *mut c_char,
        ) -> c_int,
    >,
    pub xDlOpen:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, zFilename: *const c_char) -> *mut c_void>,
    pub xDlError:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, nByte: c_int, zErrMsg: *mut c_char)>,
    pub xDlSym: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            arg2: *mut c_void,
            zSymbol: *const c_char,
        ) -> Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: *mut c_void, zSymbol: *const c_char)>,
    >,
    pub xDlClose: Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: *mut c_void)>,
    pub xRandomness:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, nByte: c_int, zOut: *mut c_char) -> c_int>,
    pub xSleep: Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, microseconds: c_int) -> c_int>,
    pub xCurrentTime: Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: *mut f64) -> c_int>,
    pub xGetLastError: Option<
        unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: c_int, arg3: *mut c_char) -> c_int,
    >,
    pub xCurrentTimeInt64:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: *mut sqlite3_int64) -> c_int>,
    pub xSetSystemCall: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: *const c_char,
            arg2: Option<unsafe extern "C" fn()>,
        ) -> c_int,
    >,
    pub xGetSystemCall: Option<
        unsafe extern "C" fn(
            arg1: *mut sqlite3_vfs,
            zName: *const c_char,
        ) -> Option<unsafe extern "C" fn()>,
    >,
    pub xNextSystemCall:
        Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, zName: *const c_char) -> *const c_char>,
}

/// The subset of `sqlite3_api_routines` used when this VFS is registered
/// from a runtime-loadable extension (`register_dynamic`) rather than linked
/// statically. Mirrors the layout of the real struct up through the members
/// this crate calls; unused trailing members are omitted because this crate
/// never indexes past them.
#[repr(C)]
pub struct sqlite3_api_routines {
    pub _unused_prefix: [*const c_void; 15],
    pub mprintf: Option<unsafe extern "C" fn(arg1: *const c_char, ...) -> *mut c_char>,
    pub _unused_mid: [*const c_void; 56],
    pub vfs_find: Option<unsafe extern "C" fn(arg1: *const c_char) -> *mut sqlite3_vfs>,
    pub vfs_register: Option<unsafe extern "C" fn(arg1: *mut sqlite3_vfs, arg2: c_int) -> c_int>,
    pub _unused_suffix: [*const c_void; 8],
    pub log: Option<unsafe extern "C" fn(arg1: c_int, arg2: *const c_char, ...)>,
    pub libversion_number: Option<unsafe extern "C" fn() -> c_int>,
}

unsafe extern "C" {
    pub fn sqlite3_vfs_register(pVfs: *mut sqlite3_vfs, makeDflt: c_int) -> c_int;
    pub fn sqlite3_vfs_find(zVfsName: *const c_char) -> *mut sqlite3_vfs;
    pub fn sqlite3_mprintf(zFormat: *const c_char, ...) -> *mut c_char;
    pub fn sqlite3_free(p: *mut c_void);
    pub fn sqlite3_log(iErrCode: c_int, zFormat: *const c_char, ...);
    pub fn sqlite3_libversion_number() -> c_int;
}

// ---------------------------------------------------------------------
// Virtual-table ABI: hand-transcribed the same
// way as the VFS types above, from the stable layouts documented at
// <https://sqlite.org/c3ref/module.html> and <https://sqlite.org/c3ref/index_info.html>.
// ---------------------------------------------------------------------

/// Opaque database connection handle. This crate never dereferences it —
/// only threads it through to `sqlite3_create_module_v2`/`sqlite3_declare_vtab`
/// — so no fields are transcribed.
#[repr(C)]
pub struct sqlite3 {
    _private: [u8; 0],
}

/// Opaque `sqlite3_value*` argument to `xFilter`/`xUpdate`.
#[repr(C)]
pub struct sqlite3_value {
    _private: [u8; 0],
}

/// Opaque `sqlite3_context*` result-setting handle passed to `xColumn`.
#[repr(C)]
pub struct sqlite3_context {
    _private: [u8; 0],
}

/// Base "superclass" every virtual-table struct embeds as its first field
/// (the same `repr(C)` subclassing idiom as `sqlite3_file`/`FileWrapper`).
#[repr(C)]
pub struct sqlite3_vtab {
    pub pModule: *const sqlite3_module,
    pub nRef: c_int,
    pub zErrMsg: *mut c_char,
}

/// Base "superclass" every cursor struct embeds as its first field.
#[repr(C)]
pub struct sqlite3_vtab_cursor {
    pub pVtab: *mut sqlite3_vtab,
}

#[repr(C)]
pub struct sqlite3_index_constraint {
    pub iColumn: c_int,
    pub op: u8,
    pub usable: u8,
    pub iTermOffset: c_int,
}

#[repr(C)]
pub struct sqlite3_index_orderby {
    pub iColumn: c_int,
    pub desc: u8,
}

#[repr(C)]
pub struct sqlite3_index_constraint_usage {
    pub argvIndex: c_int,
    pub omit: u8,
}

#[repr(C)]
pub struct sqlite3_index_info {
    pub nConstraint: c_int,
    pub aConstraint: *const sqlite3_index_constraint,
    pub nOrderBy: c_int,
    pub aOrderBy: *const sqlite3_index_orderby,
    pub aConstraintUsage: *mut sqlite3_index_constraint_usage,
    pub idxNum: c_int,
    pub idxStr: *mut c_char,
    pub needToFreeIdxStr: c_int,
    pub orderByConsumed: c_int,
    pub estimatedCost: f64,
    pub estimatedRows: sqlite3_int64,
    pub idxFlags: c_int,
    pub colUsed: u64,
}

pub const SQLITE_INDEX_CONSTRAINT_EQ: u8 = 2;
pub const SQLITE_INDEX_CONSTRAINT_GT: u8 = 4;
pub const SQLITE_INDEX_CONSTRAINT_LE: u8 = 8;
pub const SQLITE_INDEX_CONSTRAINT_LT: u8 = 16;
pub const SQLITE_INDEX_CONSTRAINT_GE: u8 = 32;

/// `sqlite3_module`, transcribed through the `xShadowName` (v3) member;
/// trailing members beyond what a given `iVersion` promises are left
/// `None` the same way `sqlite3_io_methods`'s shared-memory members are
/// above — present for layout correctness, never called.
#[repr(C)]
pub struct sqlite3_module {
    pub iVersion: c_int,
    pub xCreate: Option<
        unsafe extern "C" fn(
            db: *mut sqlite3,
            pAux: *mut c_void,
            argc: c_int,
            argv: *const *const c_char,
            ppVTab: *mut *mut sqlite3_vtab,
            pzErr: *mut *mut c_char,
        ) -> c_int,
    >,
    pub xConnect: Option<
        unsafe extern "C" fn(
            db: *mut sqlite3,
            pAux: *mut c_void,
            argc: c_int,
            argv: *const *const c_char,
            ppVTab: *mut *mut sqlite3_vtab,
            pzErr: *mut *mut c_char,
        ) -> c_int,
    >,
    pub xBestIndex:
        Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab, info: *mut sqlite3_index_info) -> c_int>,
    pub xDisconnect: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xDestroy: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xOpen: Option<
        unsafe extern "C" fn(pVTab: *mut sqlite3_vtab, ppCursor: *mut *mut sqlite3_vtab_cursor) -> c_int,
    >,
    pub xClose: Option<unsafe extern "C" fn(pCursor: *mut sqlite3_vtab_cursor) -> c_int>,
    pub xFilter: Option<
        unsafe extern "C" fn(
            pCursor: *mut sqlite3_vtab_cursor,
            idxNum: c_int,
            idxStr: *const c_char,
            argc: c_int,
            argv: *mut *mut sqlite3_value,
        ) -> c_int,
    >,
    pub xNext: Option<unsafe extern "C" fn(pCursor: *mut sqlite3_vtab_cursor) -> c_int>,
    pub xEof: Option<unsafe extern "C" fn(pCursor: *mut sqlite3_vtab_cursor) -> c_int>,
    pub xColumn: Option<
        unsafe extern "C" fn(
            pCursor: *mut sqlite3_vtab_cursor,
            ctx: *mut sqlite3_context,
            n: c_int,
        ) -> c_int,
    >,
    pub xRowid: Option<
        unsafe extern "C" fn(pCursor: *mut sqlite3_vtab_cursor, pRowid: *mut sqlite3_int64) -> c_int,
    >,
    pub xUpdate: Option<
        unsafe extern "C" fn(
            pVTab: *mut sqlite3_vtab,
            argc: c_int,
            argv: *mut *mut sqlite3_value,
            pRowid: *mut sqlite3_int64,
        ) -> c_int,
    >,
    pub xBegin: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xSync: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xCommit: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xRollback: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab) -> c_int>,
    pub xFindFunction: Option<
        unsafe extern "C" fn(
            pVtab: *mut sqlite3_vtab,
            nArg: c_int,
            zName: *const c_char,
            pxFunc: *mut Option<unsafe extern "C" fn(*mut sqlite3_context, c_int, *mut *mut sqlite3_value)>,
            ppArg: *mut *mut c_void,
        ) -> c_int,
    >,
    pub xRename:
        Option<unsafe extern "C" fn(pVtab: *mut sqlite3_vtab, zNew: *const c_char) -> c_int>,
    pub xSavepoint: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab, n: c_int) -> c_int>,
    pub xRelease: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab, n: c_int) -> c_int>,
    pub xRollbackTo: Option<unsafe extern "C" fn(pVTab: *mut sqlite3_vtab, n: c_int) -> c_int>,
    pub xShadowName: Option<unsafe extern "C" fn(zName: *const c_char) -> c_int>,
}

unsafe extern "C" {
    pub fn sqlite3_create_module_v2(
        db: *mut sqlite3,
        zName: *const c_char,
        pModule: *const sqlite3_module,
        pAux: *mut c_void,
        xDestroy: Option<unsafe extern "C" fn(*mut c_void)>,
    ) -> c_int;
    pub fn sqlite3_declare_vtab(db: *mut sqlite3, zSql: *const c_char) -> c_int;
    pub fn sqlite3_value_int64(value: *mut sqlite3_value) -> sqlite3_int64;
    pub fn sqlite3_value_type(value: *mut sqlite3_value) -> c_int;
    pub fn sqlite3_result_int64(ctx: *mut sqlite3_context, v: sqlite3_int64);
    pub fn sqlite3_result_null(ctx: *mut sqlite3_context);
}
