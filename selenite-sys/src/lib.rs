#![allow(clippy::missing_safety_doc)]

pub mod ffi {
    //! C ffi for the vendored SQLite engine.

    pub use libsqlite3_sys::*;

    // The bundled libsqlite3-sys bindings omit `sqlite3_close_v2` even though
    // the vendored SQLite library is compiled with it; declare it directly so
    // it can still be linked against.
    extern "C" {
        pub fn sqlite3_close_v2(db: *mut sqlite3) -> std::os::raw::c_int;
    }
}

mod error;
mod statement;
mod value;

pub use error::{Error, Result};
pub use statement::{prepare_stmt, Statement};
pub use value::{Value, ValueType};

use std::ffi::{c_char, c_int};

/// Returns `(string ptr, len as c_int)` for handing a Rust string slice to
/// sqlite3 APIs that take a pointer plus byte count.
/// Returns an error if the string is too large for sqlite.
pub(crate) fn str_for_sqlite(s: &[u8]) -> Result<(*const c_char, c_int)> {
    let len = len_as_c_int(s.len())?;
    let ptr = if len != 0 {
        s.as_ptr().cast::<c_char>()
    } else {
        // Return a pointer guaranteed to live forever
        "".as_ptr().cast::<c_char>()
    };
    Ok((ptr, len))
}

// Helper to cast to c_int safely, returning the correct error type if the cast
// failed.
pub(crate) fn len_as_c_int(len: usize) -> Result<c_int> {
    if len >= (c_int::MAX as usize) {
        Err(Error::from(ffi::SQLITE_TOOBIG))
    } else {
        Ok(len as c_int)
    }
}

#[must_use]
#[allow(non_snake_case)]
pub fn SQLITE_TRANSIENT() -> ffi::sqlite3_destructor_type {
    Some(unsafe { std::mem::transmute(-1_isize) })
}
