//! # Selenite
//!
//! Selenite embeds SQLite directly in your process and puts a typed, safe
//! API over the C engine: connections, prepared statements with typed
//! binding and extraction, transactions and savepoints, user-defined scalar
//! and aggregate functions, update hooks, incremental BLOB I/O, online
//! backup, whole-database serialization and host-defined virtual tables.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use selenite::Connection;
//!
//! fn main() -> selenite::Result<()> {
//!     let conn = Connection::open_memory()?;
//!     conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!     conn.execute("INSERT INTO users (name) VALUES (?1)", ("Alice",))?;
//!
//!     for row in conn.query("SELECT id, name FROM users", ())? {
//!         let id: i64 = row.get_as(0)?;
//!         let name: String = row.get_by_name_as("name")?;
//!         println!("{id}: {name}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Threading
//!
//! A [`Connection`] may move between threads but is not usable from two
//! threads at once; statements, BLOB handles and backups keep their
//! connection alive. Cross-thread cancellation goes through
//! [`Connection::interrupt_handle`].
//!
//! The vendored engine is compiled with FTS5, R-Tree and column metadata
//! enabled; `CREATE VIRTUAL TABLE ... USING fts5(...)` works out of the box
//! through [`Connection::exec_raw`].

pub mod backup;
pub mod blob;
mod connection;
pub mod errors;
pub mod functions;
pub mod hooks;
mod params;
pub mod pragma;
mod rows;
mod serialize;
mod statement;
mod transaction;
pub mod value;
pub mod vtab;

pub use backup::Backup;
pub use blob::{Blob, BlobMode};
pub use connection::{Connection, DatabaseName, InterruptHandle, OpenFlags};
pub use errors::Error;
pub use functions::FunctionFlags;
pub use hooks::Op;
pub use params::{params_from_iter, IntoParams, Params};
pub use pragma::{AutoVacuum, JournalMode, Synchronous, TempStore};
pub use rows::{Column, ColumnMetadata, Row, Rows};
pub use statement::Statement;
pub use transaction::{Savepoint, Transaction, TransactionBehavior};
pub use value::{FromValue, IntoValue, Value, ValueRef, ValueType};

/// Convenient alias for boxed dynamic errors carried inside [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn str_to_cstring(s: &str) -> Result<std::ffi::CString> {
    std::ffi::CString::new(s)
        .map_err(|_| Error::Misuse(format!("string contains a NUL byte: `{s}`")))
}
