//! Low-level SQLite handles
//!
//! Thin owners of `sqlite3*` and `sqlite3_stmt*` built on `rusqlite::ffi`.
//! The session layer needs to hold compiled statements across calls, reset
//! them for reuse, install a busy handler with its own context and sweep
//! leaked statements on close, none of which rusqlite's borrowing
//! `Statement<'conn>` allows. All `unsafe` in the crate lives here.

use parking_lot::Mutex;
use rusqlite::ffi;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

// libsqlite3-sys blocklists `sqlite3_close_v2` from its generated bindings;
// the symbol is still exported by the linked SQLite library.
extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// Signature of an engine busy callback
pub(crate) type BusyCallback = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;

/// Outcome of advancing a statement by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available
    Row,
    /// The statement ran to completion
    Done,
    /// The database file is locked by another connection
    Busy,
    /// A table is locked by this connection
    Locked,
    /// The statement was interrupted
    Interrupted,
    /// SQL or runtime error
    Error(c_int),
    /// The statement was used incorrectly
    Misuse,
}

impl StepResult {
    pub(crate) fn from_code(rc: c_int) -> Self {
        match rc & 0xff {
            ffi::SQLITE_ROW => StepResult::Row,
            ffi::SQLITE_DONE => StepResult::Done,
            ffi::SQLITE_BUSY => StepResult::Busy,
            ffi::SQLITE_LOCKED => StepResult::Locked,
            ffi::SQLITE_INTERRUPT => StepResult::Interrupted,
            ffi::SQLITE_MISUSE => StepResult::Misuse,
            _ => StepResult::Error(rc),
        }
    }
}

/// Storage class of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

/// English description of a result code
pub(crate) fn error_string(rc: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static, NUL-terminated string.
    unsafe { cstr_to_string(ffi::sqlite3_errstr(rc)) }
}

/// Copy a NUL-terminated engine string; null yields an empty string.
unsafe fn cstr_to_string(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        CStr::from_ptr(p).to_string_lossy().into_owned()
    }
}

#[derive(Clone, Copy)]
struct DbPtr(*mut ffi::sqlite3);

// SQLite is built in serialized threading mode; sqlite3_interrupt may be
// called from any thread while the handle is open.
unsafe impl Send for DbPtr {}

/// Cancels the statement running on a session from another thread
///
/// The handle stays valid across close and reopen; interrupting a closed
/// session is a no-op that returns `false`.
#[derive(Clone)]
pub struct InterruptHandle {
    db: Arc<Mutex<DbPtr>>,
}

impl InterruptHandle {
    pub(crate) fn new() -> Self {
        Self {
            db: Arc::new(Mutex::new(DbPtr(ptr::null_mut()))),
        }
    }

    pub(crate) fn attach(&self, connection: &RawConnection) {
        self.db.lock().0 = connection.db;
    }

    pub(crate) fn detach(&self) {
        self.db.lock().0 = ptr::null_mut();
    }

    /// Interrupt the running statement; returns whether a connection was open
    pub fn interrupt(&self) -> bool {
        let db = self.db.lock();
        if db.0.is_null() {
            return false;
        }
        // SAFETY: the pointer is cleared under this lock before the
        // connection is closed, so it is live here.
        unsafe { ffi::sqlite3_interrupt(db.0) };
        true
    }
}

/// Owned `sqlite3*` connection handle
pub(crate) struct RawConnection {
    db: *mut ffi::sqlite3,
}

// The connection is only touched through the session's mutex.
unsafe impl Send for RawConnection {}

impl RawConnection {
    /// Open `path` with `sqlite3_open_v2`
    pub(crate) fn open(
        path: &str,
        flags: c_int,
        vfs: Option<&str>,
    ) -> std::result::Result<Self, (c_int, String)> {
        let c_path = CString::new(path).map_err(|e| (ffi::SQLITE_MISUSE, e.to_string()))?;
        let c_vfs = match vfs {
            Some(name) => Some(CString::new(name).map_err(|e| (ffi::SQLITE_MISUSE, e.to_string()))?),
            None => None,
        };
        let vfs_ptr = c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr());

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: all pointers are valid NUL-terminated strings or null.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, vfs_ptr) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: a handle returned alongside an error must still be closed.
                unsafe {
                    let message = cstr_to_string(ffi::sqlite3_errmsg(db));
                    ffi::sqlite3_close(db);
                    message
                }
            };
            return Err((rc, message));
        }
        Ok(Self { db })
    }

    /// Try to close the handle; on success the handle becomes empty
    pub(crate) fn close(&mut self) -> c_int {
        if self.db.is_null() {
            return ffi::SQLITE_OK;
        }
        // SAFETY: db is a live handle owned by self.
        let rc = unsafe { ffi::sqlite3_close(self.db) };
        if rc == ffi::SQLITE_OK {
            self.db = ptr::null_mut();
        }
        rc
    }

    /// Finalize every statement the engine still has open on this handle
    ///
    /// Returns how many were finalized.
    pub(crate) fn finalize_outstanding(&mut self) -> usize {
        let mut finalized = 0;
        if self.db.is_null() {
            return finalized;
        }
        loop {
            // SAFETY: db is live; each returned statement belongs to it.
            let stmt = unsafe { ffi::sqlite3_next_stmt(self.db, ptr::null_mut()) };
            if stmt.is_null() {
                break;
            }
            unsafe { ffi::sqlite3_finalize(stmt) };
            finalized += 1;
        }
        finalized
    }

    /// Compile `sql`; `Ok(None)` when the text holds no statement
    pub(crate) fn prepare(&self, sql: &CStr) -> std::result::Result<Option<RawStatement>, c_int> {
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: db is live and sql is NUL-terminated; on failure stmt stays null.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db, sql.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            if !stmt.is_null() {
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(rc);
        }
        if stmt.is_null() {
            return Ok(None);
        }
        Ok(Some(RawStatement { stmt }))
    }

    /// Run one or more statements, discarding any rows
    pub(crate) fn exec(&self, sql: &CStr) -> std::result::Result<(), (c_int, String)> {
        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: db is live; errmsg is allocated by SQLite and freed below.
        let rc = unsafe {
            ffi::sqlite3_exec(self.db, sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        let message = if errmsg.is_null() {
            self.errmsg()
        } else {
            unsafe {
                let message = cstr_to_string(errmsg);
                ffi::sqlite3_free(errmsg.cast());
                message
            }
        };
        Err((rc, message))
    }

    /// Install `callback` as the busy handler with `context` as its argument
    ///
    /// `context` must stay valid until the handler is removed or the
    /// connection is closed.
    pub(crate) fn set_busy_handler(&self, callback: BusyCallback, context: *mut c_void) {
        // SAFETY: db is live; the caller guarantees context outlives the registration.
        unsafe { ffi::sqlite3_busy_handler(self.db, Some(callback), context) };
    }

    /// Remove any busy handler so contention fails immediately
    pub(crate) fn clear_busy_handler(&self) {
        unsafe { ffi::sqlite3_busy_handler(self.db, None, ptr::null_mut()) };
    }

    pub(crate) fn errmsg(&self) -> String {
        unsafe { cstr_to_string(ffi::sqlite3_errmsg(self.db)) }
    }

    pub(crate) fn errcode(&self) -> c_int {
        unsafe { ffi::sqlite3_errcode(self.db) }
    }

    pub(crate) fn extended_errcode(&self) -> c_int {
        unsafe { ffi::sqlite3_extended_errcode(self.db) }
    }

    pub(crate) fn changes(&self) -> u64 {
        let changes = unsafe { ffi::sqlite3_changes(self.db) };
        changes.max(0) as u64
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: close_v2 defers the close until remaining statements
            // are finalized, so no statement handle is left dangling.
            unsafe { sqlite3_close_v2(self.db) };
            self.db = ptr::null_mut();
        }
    }
}

/// Owned `sqlite3_stmt*` compiled-statement handle
///
/// Must be finalized before its connection is closed; the session enforces
/// this ordering.
pub(crate) struct RawStatement {
    stmt: *mut ffi::sqlite3_stmt,
}

// Statements are only touched through the session's mutex.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(crate) fn parameter_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) };
        count.max(0) as usize
    }

    pub(crate) fn bind_null(&self, index: c_int) -> c_int {
        unsafe { ffi::sqlite3_bind_null(self.stmt, index) }
    }

    pub(crate) fn bind_int(&self, index: c_int, value: i32) -> c_int {
        unsafe { ffi::sqlite3_bind_int(self.stmt, index, value) }
    }

    pub(crate) fn bind_int64(&self, index: c_int, value: i64) -> c_int {
        unsafe { ffi::sqlite3_bind_int64(self.stmt, index, value) }
    }

    pub(crate) fn bind_double(&self, index: c_int, value: f64) -> c_int {
        unsafe { ffi::sqlite3_bind_double(self.stmt, index, value) }
    }

    pub(crate) fn bind_text(&self, index: c_int, value: &str) -> c_int {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    /// Bind bytes; an empty slice binds a zero-length blob rather than NULL
    pub(crate) fn bind_blob(&self, index: c_int, value: &[u8]) -> c_int {
        if value.is_empty() {
            return unsafe { ffi::sqlite3_bind_zeroblob(self.stmt, index, 0) };
        }
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: SQLITE_TRANSIENT makes SQLite copy the bytes before returning.
        unsafe {
            ffi::sqlite3_bind_blob(
                self.stmt,
                index,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    pub(crate) fn step(&self) -> c_int {
        unsafe { ffi::sqlite3_step(self.stmt) }
    }

    /// Rewind to before the first row and drop all bindings
    pub(crate) fn reset(&self) -> c_int {
        unsafe {
            let rc = ffi::sqlite3_reset(self.stmt);
            ffi::sqlite3_clear_bindings(self.stmt);
            rc
        }
    }

    pub(crate) fn column_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        count.max(0) as usize
    }

    pub(crate) fn column_name(&self, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        let name = unsafe { ffi::sqlite3_column_name(self.stmt, index) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { cstr_to_string(name) })
        }
    }

    pub(crate) fn column_type(&self, index: usize) -> ColumnType {
        let Ok(index) = c_int::try_from(index) else {
            return ColumnType::Null;
        };
        match unsafe { ffi::sqlite3_column_type(self.stmt, index) } {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }

    pub(crate) fn column_int(&self, index: usize) -> i32 {
        c_int::try_from(index)
            .map(|i| unsafe { ffi::sqlite3_column_int(self.stmt, i) })
            .unwrap_or(0)
    }

    pub(crate) fn column_int64(&self, index: usize) -> i64 {
        c_int::try_from(index)
            .map(|i| unsafe { ffi::sqlite3_column_int64(self.stmt, i) })
            .unwrap_or(0)
    }

    pub(crate) fn column_double(&self, index: usize) -> f64 {
        c_int::try_from(index)
            .map(|i| unsafe { ffi::sqlite3_column_double(self.stmt, i) })
            .unwrap_or(0.0)
    }

    pub(crate) fn column_text(&self, index: usize) -> Option<String> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: the text pointer is valid until the next step/reset, and
        // sqlite3_column_bytes must be read after sqlite3_column_text.
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, index);
            if text.is_null() {
                return None;
            }
            let len = ffi::sqlite3_column_bytes(self.stmt, index).max(0) as usize;
            let bytes = std::slice::from_raw_parts(text, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub(crate) fn column_blob(&self, index: usize) -> Option<Vec<u8>> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: as for column_text; a zero-length blob yields a null pointer.
        unsafe {
            let blob = ffi::sqlite3_column_blob(self.stmt, index);
            let len = ffi::sqlite3_column_bytes(self.stmt, index).max(0) as usize;
            if blob.is_null() || len == 0 {
                return Some(Vec::new());
            }
            Some(std::slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
        }
    }

    /// Release the compiled statement
    pub(crate) fn finalize(self) -> c_int {
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        std::mem::forget(self);
        rc
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        unsafe { ffi::sqlite3_finalize(self.stmt) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> RawConnection {
        RawConnection::open(
            ":memory:",
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_prepare_step_columns() {
        let conn = memory();
        let stmt = conn.prepare(c"SELECT 1 AS one, 'two' AS two, NULL AS three").unwrap().unwrap();
        assert_eq!(stmt.parameter_count(), 0);
        assert_eq!(stmt.column_count(), 3);
        assert_eq!(stmt.column_name(1).as_deref(), Some("two"));

        assert_eq!(StepResult::from_code(stmt.step()), StepResult::Row);
        assert_eq!(stmt.column_type(0), ColumnType::Integer);
        assert_eq!(stmt.column_int(0), 1);
        assert_eq!(stmt.column_text(1).as_deref(), Some("two"));
        assert_eq!(stmt.column_type(2), ColumnType::Null);
        assert_eq!(stmt.column_text(2), None);
        assert_eq!(StepResult::from_code(stmt.step()), StepResult::Done);
        assert_eq!(stmt.finalize(), ffi::SQLITE_OK);
    }

    #[test]
    fn test_prepare_errors() {
        let conn = memory();
        assert!(conn.prepare(c"SELEC nonsense").is_err());
        assert!(conn.errmsg().contains("syntax error"));
        assert!(matches!(conn.prepare(c"   "), Ok(None)));
    }

    #[test]
    fn test_bindings_and_reset() {
        let conn = memory();
        let stmt = conn.prepare(c"SELECT ?, ?, ?, ?").unwrap().unwrap();
        assert_eq!(stmt.parameter_count(), 4);
        assert_eq!(stmt.bind_int64(1, 1 << 40), ffi::SQLITE_OK);
        assert_eq!(stmt.bind_text(2, "héllo"), ffi::SQLITE_OK);
        assert_eq!(stmt.bind_blob(3, &[]), ffi::SQLITE_OK);
        assert_eq!(stmt.bind_double(4, 2.5), ffi::SQLITE_OK);
        assert_eq!(stmt.step(), ffi::SQLITE_ROW);
        assert_eq!(stmt.column_int64(0), 1 << 40);
        assert_eq!(stmt.column_text(1).as_deref(), Some("héllo"));
        assert_eq!(stmt.column_type(2), ColumnType::Blob);
        assert_eq!(stmt.column_blob(2), Some(Vec::new()));
        assert_eq!(stmt.column_double(3), 2.5);

        assert_eq!(stmt.reset(), ffi::SQLITE_OK);
        assert_eq!(stmt.step(), ffi::SQLITE_ROW);
        assert_eq!(stmt.column_type(0), ColumnType::Null);
    }

    #[test]
    fn test_close_sweeps_leaked_statements() {
        let mut conn = memory();
        let stmt = conn.prepare(c"SELECT 1").unwrap().unwrap();
        std::mem::forget(stmt);
        assert_eq!(conn.close(), ffi::SQLITE_BUSY);
        assert_eq!(conn.finalize_outstanding(), 1);
        assert_eq!(conn.close(), ffi::SQLITE_OK);
        assert_eq!(conn.close(), ffi::SQLITE_OK);
    }

    #[test]
    fn test_interrupt_handle_detached() {
        let conn = memory();
        let handle = InterruptHandle::new();
        assert!(!handle.interrupt());
        handle.attach(&conn);
        assert!(handle.interrupt());
        handle.detach();
        assert!(!handle.interrupt());
    }
}
