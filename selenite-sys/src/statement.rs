#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_char, c_int};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::SQLITE_TRANSIENT;

/// A raw prepared statement. Finalize is idempotent; dropping the wrapper
/// finalizes the statement if the caller has not done so already.
#[derive(Debug)]
pub struct Statement {
    pub raw_stmt: *mut crate::ffi::sqlite3_stmt,
    finalized: AtomicBool,
    tail: usize,
}

// Safety: the engine is compiled with its serialized threading model; the
// bridge additionally never shares one statement across threads.
unsafe impl Send for Statement {}

impl Drop for Statement {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl Statement {
    pub fn finalize(&self) -> c_int {
        if !self.finalized.swap(true, Ordering::SeqCst) {
            unsafe { crate::ffi::sqlite3_finalize(self.raw_stmt) }
        } else {
            crate::ffi::SQLITE_OK
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn bind_null(&self, idx: i32) -> c_int {
        unsafe { crate::ffi::sqlite3_bind_null(self.raw_stmt, idx) }
    }

    pub fn bind_int64(&self, idx: i32, value: i64) -> c_int {
        unsafe { crate::ffi::sqlite3_bind_int64(self.raw_stmt, idx, value) }
    }

    pub fn bind_double(&self, idx: i32, value: f64) -> c_int {
        unsafe { crate::ffi::sqlite3_bind_double(self.raw_stmt, idx, value) }
    }

    pub fn bind_text(&self, idx: i32, value: &[u8]) -> c_int {
        unsafe {
            crate::ffi::sqlite3_bind_text(
                self.raw_stmt,
                idx,
                value.as_ptr() as *const c_char,
                value.len() as i32,
                SQLITE_TRANSIENT(),
            )
        }
    }

    pub fn bind_blob(&self, idx: i32, value: &[u8]) -> c_int {
        unsafe {
            crate::ffi::sqlite3_bind_blob(
                self.raw_stmt,
                idx,
                value.as_ptr() as *const std::ffi::c_void,
                value.len() as i32,
                SQLITE_TRANSIENT(),
            )
        }
    }

    pub fn bind_zeroblob(&self, idx: i32, len: i32) -> c_int {
        unsafe { crate::ffi::sqlite3_bind_zeroblob(self.raw_stmt, idx, len) }
    }

    pub fn clear_bindings(&self) -> c_int {
        unsafe { crate::ffi::sqlite3_clear_bindings(self.raw_stmt) }
    }

    pub fn step(&self) -> c_int {
        unsafe { crate::ffi::sqlite3_step(self.raw_stmt) }
    }

    pub fn reset(&self) -> c_int {
        unsafe { crate::ffi::sqlite3_reset(self.raw_stmt) }
    }

    pub fn column_count(&self) -> i32 {
        unsafe { crate::ffi::sqlite3_column_count(self.raw_stmt) }
    }

    pub fn column_type(&self, idx: i32) -> i32 {
        unsafe { crate::ffi::sqlite3_column_type(self.raw_stmt, idx) }
    }

    pub fn column_int64(&self, idx: i32) -> i64 {
        unsafe { crate::ffi::sqlite3_column_int64(self.raw_stmt, idx) }
    }

    pub fn column_double(&self, idx: i32) -> f64 {
        unsafe { crate::ffi::sqlite3_column_double(self.raw_stmt, idx) }
    }

    /// Reads a TEXT cell as raw bytes. The byte count comes from
    /// `sqlite3_column_bytes`, so text with embedded NULs round-trips.
    pub fn column_text(&self, idx: i32) -> &[u8] {
        unsafe {
            // To avoid problems, extract the desired type first, then call
            // sqlite3_column_bytes; the other order can invalidate the pointer.
            let text = crate::ffi::sqlite3_column_text(self.raw_stmt, idx);
            let len = crate::ffi::sqlite3_column_bytes(self.raw_stmt, idx);
            assert!(
                !text.is_null(),
                "unexpected SQLITE_TEXT column type with NULL data"
            );
            std::slice::from_raw_parts(text.cast::<u8>(), len as usize)
        }
    }

    pub fn column_blob(&self, idx: i32) -> &[u8] {
        unsafe {
            let blob = crate::ffi::sqlite3_column_blob(self.raw_stmt, idx);
            let len = crate::ffi::sqlite3_column_bytes(self.raw_stmt, idx);
            assert!(
                len >= 0,
                "unexpected negative return from sqlite3_column_bytes"
            );
            if len > 0 {
                assert!(
                    !blob.is_null(),
                    "unexpected SQLITE_BLOB column type with NULL data"
                );
                std::slice::from_raw_parts(blob.cast::<u8>(), len as usize)
            } else {
                // sqlite3_column_blob returns a NULL pointer for a zero-length
                // BLOB.
                &[]
            }
        }
    }

    pub fn column_name(&self, idx: i32) -> Option<&str> {
        let raw_name = unsafe { crate::ffi::sqlite3_column_name(self.raw_stmt, idx) };
        cstr_opt(raw_name)
    }

    pub fn column_origin_name(&self, idx: i32) -> Option<&str> {
        let raw_name = unsafe { crate::ffi::sqlite3_column_origin_name(self.raw_stmt, idx) };
        cstr_opt(raw_name)
    }

    pub fn column_table_name(&self, idx: i32) -> Option<&str> {
        let raw_name = unsafe { crate::ffi::sqlite3_column_table_name(self.raw_stmt, idx) };
        cstr_opt(raw_name)
    }

    pub fn column_database_name(&self, idx: i32) -> Option<&str> {
        let raw_name = unsafe { crate::ffi::sqlite3_column_database_name(self.raw_stmt, idx) };
        cstr_opt(raw_name)
    }

    pub fn column_decltype(&self, idx: i32) -> Option<&str> {
        let raw_name = unsafe { crate::ffi::sqlite3_column_decltype(self.raw_stmt, idx) };
        cstr_opt(raw_name)
    }

    pub fn bind_parameter_index(&self, name: &str) -> i32 {
        let raw_name = match std::ffi::CString::new(name) {
            Ok(name) => name,
            // Parameter names with interior NULs cannot exist in prepared SQL.
            Err(_) => return 0,
        };
        unsafe { crate::ffi::sqlite3_bind_parameter_index(self.raw_stmt, raw_name.as_ptr()) }
    }

    pub fn bind_parameter_count(&self) -> usize {
        unsafe { crate::ffi::sqlite3_bind_parameter_count(self.raw_stmt) as usize }
    }

    pub fn bind_parameter_name(&self, index: i32) -> Option<&str> {
        let name = unsafe { crate::ffi::sqlite3_bind_parameter_name(self.raw_stmt, index) };
        cstr_opt(name)
    }

    pub fn readonly(&self) -> bool {
        unsafe { crate::ffi::sqlite3_stmt_readonly(self.raw_stmt) != 0 }
    }

    pub fn tail(&self) -> usize {
        self.tail
    }
}

fn cstr_opt<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    let raw = unsafe { std::ffi::CStr::from_ptr(ptr) };
    // NOTICE: sqlite3 promises UTF-8 for these
    Some(raw.to_str().unwrap())
}

pub unsafe fn prepare_stmt(raw: *mut crate::ffi::sqlite3, sql: &str) -> Result<Statement> {
    let mut raw_stmt = std::ptr::null_mut();
    let (c_sql, len) = crate::str_for_sqlite(sql.as_bytes())?;
    let mut c_tail: *const c_char = std::ptr::null_mut();

    let err =
        unsafe { crate::ffi::sqlite3_prepare_v2(raw, c_sql, len, &mut raw_stmt, &mut c_tail) };

    // If the input text contains no SQL (if the input is an empty string or a
    // comment) then *ppStmt is set to NULL.
    let tail = if c_tail.is_null() {
        0
    } else {
        let n = (c_tail as isize) - (c_sql as isize);
        if n <= 0 || n >= len as isize {
            0
        } else {
            n as usize
        }
    };

    match err {
        crate::ffi::SQLITE_OK => Ok(Statement {
            raw_stmt,
            tail,
            finalized: AtomicBool::new(false),
        }),
        _ => Err(err.into()),
    }
}
