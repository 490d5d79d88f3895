use std::ffi::c_int;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to connect to database: `{0}`")]
    ConnectionFailed(String),
    /// An error surfaced by the engine. The code is the extended result code,
    /// passed through unchanged so callers can dispatch on it.
    #[error("SQLite failure: `{1}`")]
    SqliteFailure(c_int, String),
    #[error("Cannot bind parameter: `{0}`")]
    Bind(String),
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("Column not found: `{0}`")]
    ColumnNotFound(String),
    #[error("Unexpected NULL in column `{0}`")]
    NullColumn(String),
    #[error("{0} used after close")]
    ClosedHandle(&'static str),
    #[error("Write attempted on a read-only surface")]
    ReadOnly,
    #[error("Execute returned rows")]
    ExecuteReturnedRows,
    #[error("SQL conversion failure: `{0}`")]
    ToSqlConversionFailure(crate::BoxError),
    #[error("API misuse: `{0}`")]
    Misuse(String),
}

impl Error {
    /// The engine result code carried by this error, if it originated in the
    /// engine.
    pub fn sqlite_error_code(&self) -> Option<c_int> {
        match self {
            Error::SqliteFailure(code, _) => Some(*code),
            _ => None,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        unreachable!()
    }
}

pub(crate) fn error_from_handle(raw: *mut selenite_sys::ffi::sqlite3) -> String {
    let errmsg = unsafe { selenite_sys::ffi::sqlite3_errmsg(raw) };
    sqlite_errmsg_to_string(errmsg)
}

pub(crate) fn extended_error_code(raw: *mut selenite_sys::ffi::sqlite3) -> c_int {
    unsafe { selenite_sys::ffi::sqlite3_extended_errcode(raw) }
}

pub fn error_from_code(code: c_int) -> String {
    let errmsg = unsafe { selenite_sys::ffi::sqlite3_errstr(code) };
    sqlite_errmsg_to_string(errmsg)
}

#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub(crate) fn sqlite_errmsg_to_string(errmsg: *const std::ffi::c_char) -> String {
    let errmsg = unsafe { std::ffi::CStr::from_ptr(errmsg) }.to_bytes();
    String::from_utf8_lossy(errmsg).to_string()
}
