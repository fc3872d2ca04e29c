//! Component I: an array-backed virtual-table module.
//!
//! This is demonstration code, not part of the VFS core: it exists to show
//! that the crate's registration boundary isn't limited to `xOpen`-family
//! callbacks — a consumer can also hang a `sqlite3_module` off the same
//! `sqlite3_api_routines`/raw-connection surface the facade uses. Nothing
//! in [`crate::idbvfs`] or the page stores depends on this module, and
//! nothing here depends on them.
//!
//! Modeled on SQLite's bundled `carray` extension: an eponymous table that
//! exposes a Rust-side `i64` array as `CREATE TABLE array(value BIGINT)`,
//! with a rowid equal to the 1-based array position, and with its
//! `xBestIndex` recognizing constraints on that rowid so a query like
//! `SELECT value FROM array WHERE rowid BETWEEN ?1 AND ?2` scans only the
//! requested slice instead of the whole array.

use std::ffi::{CString, c_char, c_int, c_void};
use std::sync::Arc;

use crate::ffi;
use crate::vars;
use crate::vfs::{SqliteErr, VfsResult};

/// The data a registered array table serves. Implementations re-snapshot
/// on every query (`xFilter` calls [`snapshot`](ArraySource::snapshot)
/// exactly once per cursor), so a source backed by a `Mutex<Vec<i64>>` can
/// be mutated between queries without re-registering the module.
pub trait ArraySource: Send + Sync + 'static {
    fn snapshot(&self) -> Vec<i64>;
}

impl<F> ArraySource for F
where
    F: Fn() -> Vec<i64> + Send + Sync + 'static,
{
    fn snapshot(&self) -> Vec<i64> {
        self()
    }
}

/// A fixed array, the simplest possible [`ArraySource`].
impl ArraySource for Vec<i64> {
    fn snapshot(&self) -> Vec<i64> {
        self.clone()
    }
}

#[repr(C)]
struct ArrayVTab {
    base: ffi::sqlite3_vtab,
    source: Arc<dyn ArraySource>,
}

/// Encodes which bound(s) [`best_index`] found among the `WHERE` clause's
/// usable constraints on the hidden rowid column, and in what `argv` order
/// `xFilter` will receive them.
const IDX_HAS_LO: c_int = 0x1;
const IDX_HAS_HI: c_int = 0x2;

#[repr(C)]
struct ArrayCursor {
    base: ffi::sqlite3_vtab_cursor,
    rows: Vec<i64>,
    /// 1-based rowid of the next row `xNext`/the initial `xFilter` will
    /// land on; compared against `hi` by `xEof`.
    pos: i64,
    hi: i64,
}

unsafe extern "C" fn x_connect(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    _argc: c_int,
    _argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    _pz_err: *mut *mut c_char,
) -> c_int {
    // SAFETY: `aux` addresses a `Box<Arc<dyn ArraySource>>` allocated by
    // `register_array_module` and freed by this module's `xDestroy`
    // callback (`destroy_aux`), so it outlives every vtab connected here.
    // `Arc<dyn ArraySource>` is itself a sized, thin-pointer-compatible
    // value (the trait object's fat pointer lives inside the `Arc`), so no
    // unsized-pointer juggling is needed — just borrow and clone it.
    let source_for_vtab = unsafe { &*aux.cast::<Arc<dyn ArraySource>>() }.clone();

    let sql = c"CREATE TABLE x(value BIGINT)";
    let rc = unsafe { ffi::sqlite3_declare_vtab(db, sql.as_ptr()) };
    if rc != vars::SQLITE_OK {
        return rc;
    }

    let vtab = Box::new(ArrayVTab {
        base: ffi::sqlite3_vtab { pModule: std::ptr::null(), nRef: 0, zErrMsg: std::ptr::null_mut() },
        source: source_for_vtab,
    });
    unsafe { *pp_vtab = Box::into_raw(vtab).cast() };
    vars::SQLITE_OK
}

unsafe extern "C" fn x_disconnect(p_vtab: *mut ffi::sqlite3_vtab) -> c_int {
    unsafe { drop(Box::from_raw(p_vtab.cast::<ArrayVTab>())) };
    vars::SQLITE_OK
}

unsafe extern "C" fn x_best_index(p_vtab: *mut ffi::sqlite3_vtab, info: *mut ffi::sqlite3_index_info) -> c_int {
    let _ = p_vtab;
    let info = unsafe { &mut *info };
    let constraints = if info.nConstraint > 0 {
        unsafe { std::slice::from_raw_parts(info.aConstraint, info.nConstraint as usize) }
    } else {
        &[]
    };
    let usage = if info.nConstraint > 0 {
        unsafe { std::slice::from_raw_parts_mut(info.aConstraintUsage, info.nConstraint as usize) }
    } else {
        &mut []
    };

    let mut idx_num = 0;
    let mut argv_index = 1;
    for (i, c) in constraints.iter().enumerate() {
        // the hidden rowid column is reported as iColumn == -1
        if c.iColumn != -1 || c.usable == 0 {
            continue;
        }
        let is_lo = matches!(c.op, ffi::SQLITE_INDEX_CONSTRAINT_GE | ffi::SQLITE_INDEX_CONSTRAINT_GT);
        let is_hi = matches!(c.op, ffi::SQLITE_INDEX_CONSTRAINT_LE | ffi::SQLITE_INDEX_CONSTRAINT_LT);
        let is_eq = c.op == ffi::SQLITE_INDEX_CONSTRAINT_EQ;
        if is_eq && idx_num & (IDX_HAS_LO | IDX_HAS_HI) == 0 {
            idx_num = IDX_HAS_LO | IDX_HAS_HI;
            usage[i].argvIndex = argv_index;
            usage[i].omit = 1;
            argv_index += 1;
        } else if is_lo && idx_num & IDX_HAS_LO == 0 {
            idx_num |= IDX_HAS_LO;
            usage[i].argvIndex = argv_index;
            usage[i].omit = 1;
            argv_index += 1;
        } else if is_hi && idx_num & IDX_HAS_HI == 0 {
            idx_num |= IDX_HAS_HI;
            usage[i].argvIndex = argv_index;
            usage[i].omit = 1;
            argv_index += 1;
        }
    }

    info.idxNum = idx_num;
    info.estimatedCost = if idx_num == 0 { 1_000_000.0 } else { 10.0 };
    info.estimatedRows = if idx_num == 0 { 1_000_000 } else { 10 };
    vars::SQLITE_OK
}

unsafe extern "C" fn x_open(p_vtab: *mut ffi::sqlite3_vtab, pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let _ = p_vtab;
    let cursor = Box::new(ArrayCursor {
        base: ffi::sqlite3_vtab_cursor { pVtab: p_vtab },
        rows: Vec::new(),
        pos: 1,
        hi: 0,
    });
    unsafe { *pp_cursor = Box::into_raw(cursor).cast() };
    vars::SQLITE_OK
}

unsafe extern "C" fn x_close(p_cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    unsafe { drop(Box::from_raw(p_cursor.cast::<ArrayCursor>())) };
    vars::SQLITE_OK
}

unsafe extern "C" fn x_filter(
    p_cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    _idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let cursor = unsafe { &mut *p_cursor.cast::<ArrayCursor>() };
    let vtab = unsafe { &*(*p_cursor).pVtab.cast::<ArrayVTab>() };
    cursor.rows = vtab.source.snapshot();
    let len = cursor.rows.len() as i64;

    let args = if argc > 0 { unsafe { std::slice::from_raw_parts(argv, argc as usize) } } else { &[] };
    let mut lo = 1i64;
    let mut hi = len;
    let mut next = 0usize;
    if idx_num & IDX_HAS_LO != 0 {
        lo = unsafe { ffi::sqlite3_value_int64(args[next]) }.max(1);
        next += 1;
    }
    if idx_num & IDX_HAS_HI != 0 {
        hi = unsafe { ffi::sqlite3_value_int64(args[next]) }.min(len);
    }

    cursor.pos = lo;
    cursor.hi = hi;
    vars::SQLITE_OK
}

unsafe extern "C" fn x_next(p_cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cursor = unsafe { &mut *p_cursor.cast::<ArrayCursor>() };
    cursor.pos += 1;
    vars::SQLITE_OK
}

unsafe extern "C" fn x_eof(p_cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let cursor = unsafe { &*p_cursor.cast::<ArrayCursor>() };
    c_int::from(cursor.pos > cursor.hi || cursor.pos > cursor.rows.len() as i64)
}

unsafe extern "C" fn x_column(p_cursor: *mut ffi::sqlite3_vtab_cursor, ctx: *mut ffi::sqlite3_context, n: c_int) -> c_int {
    let cursor = unsafe { &*p_cursor.cast::<ArrayCursor>() };
    if n == 0 {
        if let Some(&v) = cursor.rows.get((cursor.pos - 1) as usize) {
            unsafe { ffi::sqlite3_result_int64(ctx, v) };
        } else {
            unsafe { ffi::sqlite3_result_null(ctx) };
        }
    }
    vars::SQLITE_OK
}

unsafe extern "C" fn x_rowid(p_cursor: *mut ffi::sqlite3_vtab_cursor, p_rowid: *mut ffi::sqlite3_int64) -> c_int {
    let cursor = unsafe { &*p_cursor.cast::<ArrayCursor>() };
    unsafe { *p_rowid = cursor.pos };
    vars::SQLITE_OK
}

unsafe extern "C" fn destroy_aux(aux: *mut c_void) {
    unsafe { drop(Box::from_raw(aux.cast::<Arc<dyn ArraySource>>())) };
}

const MODULE: ffi::sqlite3_module = ffi::sqlite3_module {
    iVersion: 1,
    xCreate: Some(x_connect),
    xConnect: Some(x_connect),
    xBestIndex: Some(x_best_index),
    xDisconnect: Some(x_disconnect),
    xDestroy: Some(x_disconnect),
    xOpen: Some(x_open),
    xClose: Some(x_close),
    xFilter: Some(x_filter),
    xNext: Some(x_next),
    xEof: Some(x_eof),
    xColumn: Some(x_column),
    xRowid: Some(x_rowid),
    xUpdate: None,
    xBegin: None,
    xSync: None,
    xCommit: None,
    xRollback: None,
    xFindFunction: None,
    xRename: None,
    xSavepoint: None,
    xRelease: None,
    xRollbackTo: None,
    xShadowName: None,
};

/// Registers `source` as an eponymous virtual-table module named `name` on
/// `db`. `db` must be a live `sqlite3*` (e.g. `rusqlite::Connection::handle()`
/// cast to this crate's [`ffi::sqlite3`] — both point at the same
/// `libsqlite3` struct, only the bindgen-generated marker types differ).
///
/// # Safety
/// `db` must be a valid, open `sqlite3*` for the duration of this call.
pub unsafe fn register_array_module(
    db: *mut ffi::sqlite3,
    name: &str,
    source: impl ArraySource,
) -> VfsResult<()> {
    let name = CString::new(name).map_err(|_| vars::SQLITE_INTERNAL)?;
    let aux: Arc<dyn ArraySource> = Arc::new(source);
    let aux_ptr = Box::into_raw(Box::new(aux)).cast::<c_void>();
    let rc = unsafe {
        ffi::sqlite3_create_module_v2(db, name.as_ptr(), &MODULE, aux_ptr, Some(destroy_aux))
    };
    if rc == vars::SQLITE_OK { Ok(()) } else { Err(rc as SqliteErr) }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<i64>);
    impl ArraySource for Fixed {
        fn snapshot(&self) -> Vec<i64> {
            self.0.clone()
        }
    }

    #[test]
    fn best_index_recognizes_rowid_range_constraints() {
        let ge = ffi::sqlite3_index_constraint {
            iColumn: -1,
            op: ffi::SQLITE_INDEX_CONSTRAINT_GE,
            usable: 1,
            iTermOffset: 0,
        };
        let le = ffi::sqlite3_index_constraint {
            iColumn: -1,
            op: ffi::SQLITE_INDEX_CONSTRAINT_LE,
            usable: 1,
            iTermOffset: 0,
        };
        let mut usage =
            [ffi::sqlite3_index_constraint_usage { argvIndex: 0, omit: 0 }, ffi::sqlite3_index_constraint_usage {
                argvIndex: 0,
                omit: 0,
            }];
        let constraints = [ge, le];
        let mut info = ffi::sqlite3_index_info {
            nConstraint: 2,
            aConstraint: constraints.as_ptr(),
            nOrderBy: 0,
            aOrderBy: std::ptr::null(),
            aConstraintUsage: usage.as_mut_ptr(),
            idxNum: 0,
            idxStr: std::ptr::null_mut(),
            needToFreeIdxStr: 0,
            orderByConsumed: 0,
            estimatedCost: 0.0,
            estimatedRows: 0,
            idxFlags: 0,
            colUsed: 0,
        };
        let rc = unsafe { x_best_index(std::ptr::null_mut(), &mut info) };
        assert_eq!(rc, vars::SQLITE_OK);
        assert_eq!(info.idxNum, IDX_HAS_LO | IDX_HAS_HI);
        assert_eq!(usage[0].argvIndex, 1);
        assert_eq!(usage[1].argvIndex, 2);
        assert_eq!(usage[0].omit, 1);
        assert_eq!(usage[1].omit, 1);
    }

    #[test]
    fn fixed_source_snapshots_by_value() {
        let source = Fixed(vec![10, 20, 30]);
        assert_eq!(source.snapshot(), vec![10, 20, 30]);
    }
}
