use std::ffi::{c_int, CString};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use selenite_sys::ffi;

use crate::errors;
use crate::params::IntoParams;
use crate::rows::Row;
use crate::statement::Statement;
use crate::{Error, Result};

bitflags::bitflags! {
    /// Flags passed to the engine when opening a connection.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: c_int {
        const READ_ONLY = ffi::SQLITE_OPEN_READONLY;
        const READ_WRITE = ffi::SQLITE_OPEN_READWRITE;
        const CREATE = ffi::SQLITE_OPEN_CREATE;
        const URI = ffi::SQLITE_OPEN_URI;
        const MEMORY = ffi::SQLITE_OPEN_MEMORY;
        const NO_MUTEX = ffi::SQLITE_OPEN_NOMUTEX;
        const FULL_MUTEX = ffi::SQLITE_OPEN_FULLMUTEX;
    }
}

impl Default for OpenFlags {
    fn default() -> OpenFlags {
        OpenFlags::READ_WRITE | OpenFlags::CREATE
    }
}

/// Name of a database within a connection: `main`, `temp`, or an attached
/// database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseName<'a> {
    Main,
    Temp,
    Attached(&'a str),
}

impl DatabaseName<'_> {
    pub(crate) fn as_cstring(&self) -> Result<CString> {
        let s = match *self {
            DatabaseName::Main => "main",
            DatabaseName::Temp => "temp",
            DatabaseName::Attached(s) => s,
        };
        CString::new(s).map_err(|_| Error::Misuse("database name contains a NUL byte".to_string()))
    }
}

pub(crate) struct ConnInner {
    pub(crate) raw: *mut ffi::sqlite3,
    closed: AtomicBool,
    // Nulled out under the lock when the connection closes, so an
    // InterruptHandle on another thread never touches a freed handle.
    interrupt_lock: Mutex<*mut ffi::sqlite3>,
}

impl ConnInner {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut guard = self.interrupt_lock.lock();
        // The engine does not invoke a destructor for update-hook state, so
        // release it before the handle goes away.
        unsafe { crate::hooks::clear_update_hook_ptr(self.raw) };
        // close-v2 defers teardown while statements are outstanding instead
        // of failing with SQLITE_BUSY.
        let rc = unsafe { ffi::sqlite3_close_v2(self.raw) };
        *guard = std::ptr::null_mut();
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::SqliteFailure(rc, errors::error_from_code(rc)))
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("error while closing connection: {err}");
        }
    }
}

/// A connection to an embedded SQLite database.
///
/// A connection is single-threaded: it may move between threads but is not
/// usable from two threads at once. Statements, BLOB handles and backups
/// share-own their connection, so finalization order is always child first.
pub struct Connection {
    pub(crate) inner: Arc<ConnInner>,
}

// Safety: the engine is compiled with its serialized threading model and the
// type is !Sync, so a connection is only ever driven by one thread at a time.
unsafe impl Send for Connection {}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish()
    }
}

impl Connection {
    /// Open a database file, creating it if missing.
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Connection> {
        Connection::open_with_flags(path, OpenFlags::default())
    }

    /// Open a fresh private in-memory database.
    pub fn open_memory() -> Result<Connection> {
        Connection::open_with_flags(":memory:", OpenFlags::default())
    }

    pub fn open_with_flags<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<Connection> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| Error::Misuse("database path is not valid UTF-8".to_string()))?;
        let c_path = CString::new(path)
            .map_err(|_| Error::Misuse("database path contains a NUL byte".to_string()))?;

        let mut raw = std::ptr::null_mut();
        let rc =
            unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut raw, flags.bits(), std::ptr::null()) };
        if rc != ffi::SQLITE_OK {
            // The engine allocates a handle even on failure; read the message
            // off it, then release it.
            let msg = if raw.is_null() {
                errors::error_from_code(rc)
            } else {
                let msg = errors::error_from_handle(raw);
                unsafe { ffi::sqlite3_close(raw) };
                msg
            };
            return Err(Error::ConnectionFailed(format!(
                "Unable to open database {path}: {msg}"
            )));
        }

        Ok(Connection {
            inner: Arc::new(ConnInner {
                raw,
                closed: AtomicBool::new(false),
                interrupt_lock: Mutex::new(raw),
            }),
        })
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3 {
        self.inner.raw
    }

    pub(crate) fn clone_ref(&self) -> Connection {
        Connection {
            inner: self.inner.clone(),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.inner.is_closed() {
            Err(Error::ClosedHandle("connection"))
        } else {
            Ok(())
        }
    }

    pub(crate) fn error_out(&self) -> Error {
        Error::SqliteFailure(
            errors::extended_error_code(self.raw()),
            errors::error_from_handle(self.raw()),
        )
    }

    pub(crate) fn decode_result(&self, rc: c_int) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error_out())
        }
    }

    /// Release the engine handle. Subsequent operations error with
    /// use-after-close. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Prepare the SQL statement.
    pub fn prepare(&self, sql: &str) -> Result<Statement> {
        self.ensure_open()?;
        Statement::prepare(self.clone_ref(), sql)
    }

    /// Run one or more SQL statements, discarding any rows they produce.
    /// Intended for DDL and for statements whose results are not needed.
    pub fn exec_raw(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        let mut rest = sql;
        while !rest.is_empty() {
            let stmt = unsafe { selenite_sys::prepare_stmt(self.raw(), rest) }
                .map_err(|_| self.error_out())?;
            let tail = stmt.tail();

            if !stmt.raw_stmt.is_null() {
                loop {
                    match stmt.step() {
                        ffi::SQLITE_ROW => continue,
                        ffi::SQLITE_DONE => break,
                        _ => return Err(self.error_out()),
                    }
                }
            }

            if tail == 0 || tail >= rest.len() {
                break;
            }
            rest = &rest[tail..];
        }
        Ok(())
    }

    /// Execute a single statement, returning the number of rows it changed.
    pub fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        let mut stmt = self.prepare(sql)?;
        stmt.execute(params)
    }

    /// Run a query and collect every row into memory. The rows carry the
    /// column descriptors recorded at prepare time.
    pub fn query(&self, sql: &str, params: impl IntoParams) -> Result<Vec<Row>> {
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row);
        }
        Ok(out)
    }

    /// Run a query and return its first row, if any. Remaining rows are
    /// ignored.
    pub fn query_one(&self, sql: &str, params: impl IntoParams) -> Result<Option<Row>> {
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        rows.next()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.raw()) }
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> u64 {
        unsafe { ffi::sqlite3_changes64(self.raw()) as u64 }
    }

    /// Rows changed since the connection opened.
    pub fn total_changes(&self) -> u64 {
        unsafe { ffi::sqlite3_total_changes64(self.raw()) as u64 }
    }

    pub fn is_autocommit(&self) -> bool {
        unsafe { ffi::sqlite3_get_autocommit(self.raw()) != 0 }
    }

    /// How long the engine waits on a locked database before returning BUSY.
    pub fn busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.ensure_open()?;
        let rc =
            unsafe { ffi::sqlite3_busy_timeout(self.raw(), timeout.as_millis() as c_int) };
        self.decode_result(rc)
    }

    /// Ask the engine to abort the in-flight operation at its next safe
    /// point. The stepping call fails with an interrupt error.
    pub fn interrupt(&self) {
        if self.inner.is_closed() {
            return;
        }
        unsafe { ffi::sqlite3_interrupt(self.raw()) };
    }

    pub fn is_interrupted(&self) -> bool {
        if self.inner.is_closed() {
            return false;
        }
        unsafe { ffi::sqlite3_is_interrupted(self.raw()) != 0 }
    }

    /// A `Send + Sync` handle for interrupting this connection from another
    /// thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            inner: self.inner.clone(),
        }
    }
}

/// Cancels a connection's in-flight operation from any thread.
pub struct InterruptHandle {
    inner: Arc<ConnInner>,
}

// Safety: the handle only ever touches the pointer under the interrupt lock,
// which the connection nulls out before closing, and sqlite3_interrupt is
// safe to call from any thread on a live handle.
unsafe impl Send for InterruptHandle {}
unsafe impl Sync for InterruptHandle {}

impl InterruptHandle {
    pub fn interrupt(&self) {
        let guard = self.inner.interrupt_lock.lock();
        if !guard.is_null() {
            unsafe { ffi::sqlite3_interrupt(*guard) };
        }
    }
}
