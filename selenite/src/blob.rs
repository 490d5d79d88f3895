//! Incremental BLOB I/O.
//!
//! A [`Blob`] streams bytes in and out of a single row/column cell without
//! materializing the whole payload. The cell's size is fixed for the
//! lifetime of the handle; growing a BLOB requires a SQL UPDATE (usually a
//! `zeroblob` placeholder written via
//! [`bind_zeroblob`](crate::Statement::bind_zeroblob)).

use std::ffi::c_int;
use std::sync::Arc;

use selenite_sys::ffi;

use crate::connection::{ConnInner, Connection, DatabaseName};
use crate::{Error, Result};

/// Open mode for a BLOB handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobMode {
    ReadOnly = 0,
    ReadWrite = 1,
}

/// Handle to an open BLOB cell. Close is idempotent and also runs on drop.
pub struct Blob {
    conn: Arc<ConnInner>,
    raw: *mut ffi::sqlite3_blob,
    closed: bool,
}

unsafe impl Send for Blob {}

impl Connection {
    /// Open the BLOB stored at `table.column` in the row `rowid`.
    pub fn open_blob(
        &self,
        db: DatabaseName<'_>,
        table: &str,
        column: &str,
        rowid: i64,
        mode: BlobMode,
    ) -> Result<Blob> {
        self.ensure_open()?;
        let c_db = db.as_cstring()?;
        let c_table = crate::str_to_cstring(table)?;
        let c_column = crate::str_to_cstring(column)?;
        let mut raw = std::ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_blob_open(
                self.raw(),
                c_db.as_ptr(),
                c_table.as_ptr(),
                c_column.as_ptr(),
                rowid,
                mode as c_int,
                &mut raw,
            )
        };
        self.decode_result(rc)?;
        Ok(Blob {
            conn: self.inner.clone(),
            raw,
            closed: false,
        })
    }
}

impl Blob {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ClosedHandle("blob handle"));
        }
        if self.conn.is_closed() {
            return Err(Error::ClosedHandle("connection"));
        }
        Ok(())
    }

    fn decode(&self, rc: c_int) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::SqliteFailure(
                rc,
                crate::errors::error_from_handle(self.conn.raw),
            ))
        }
    }

    /// Size of the BLOB in bytes, fixed for the lifetime of the handle.
    pub fn bytes(&self) -> usize {
        if self.closed {
            return 0;
        }
        unsafe { ffi::sqlite3_blob_bytes(self.raw) as usize }
    }

    /// Read exactly `len` bytes starting at `offset`. Fails if the range
    /// extends past the end of the BLOB.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.check_open()?;
        let mut buf = vec![0u8; len];
        let rc = unsafe {
            ffi::sqlite3_blob_read(
                self.raw,
                buf.as_mut_ptr().cast(),
                len as c_int,
                offset as c_int,
            )
        };
        self.decode(rc)?;
        Ok(buf)
    }

    /// Write `data` at `offset`. The range must fit inside the BLOB; this
    /// API cannot grow the cell.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_open()?;
        let rc = unsafe {
            ffi::sqlite3_blob_write(
                self.raw,
                data.as_ptr().cast(),
                data.len() as c_int,
                offset as c_int,
            )
        };
        self.decode(rc)
    }

    /// Point this handle at a different row of the same table and column,
    /// without reopening.
    pub fn reopen(&mut self, rowid: i64) -> Result<()> {
        self.check_open()?;
        let rc = unsafe { ffi::sqlite3_blob_reopen(self.raw, rowid) };
        self.decode(rc)
    }

    /// Release the handle. Idempotent; subsequent reads and writes fail.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let rc = unsafe { ffi::sqlite3_blob_close(self.raw) };
        self.raw = std::ptr::null_mut();
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::SqliteFailure(
                rc,
                crate::errors::error_from_code(rc),
            ))
        }
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("error while closing blob handle: {err}");
        }
    }
}
