//! Commit-time row-change notifications.

use std::ffi::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};

use selenite_sys::ffi;

use crate::connection::Connection;
use crate::Result;

/// The kind of row change an update hook observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Insert,
    Update,
    Delete,
}

struct HookContainer {
    cb: Box<dyn FnMut(Op, &str, i64) + Send>,
}

impl Connection {
    /// Install the connection's update hook, replacing any prior one.
    ///
    /// The hook runs synchronously during each row change, in modification
    /// order, and receives the opcode, the table name and the rowid. It must
    /// not run SQL on this connection. The engine accepts no error from a
    /// hook; a panicking hook is caught and logged.
    pub fn set_update_hook<F>(&self, hook: F) -> Result<()>
    where
        F: FnMut(Op, &str, i64) + Send + 'static,
    {
        self.ensure_open()?;
        let container = Box::into_raw(Box::new(HookContainer { cb: Box::new(hook) }));
        let old = unsafe {
            ffi::sqlite3_update_hook(self.raw(), Some(update_hook_cb), container.cast::<c_void>())
        };
        if !old.is_null() {
            drop(unsafe { Box::from_raw(old.cast::<HookContainer>()) });
        }
        Ok(())
    }

    /// Remove the update hook, releasing the prior callback. Idempotent.
    pub fn clear_update_hook(&self) -> Result<()> {
        self.ensure_open()?;
        unsafe { clear_update_hook_ptr(self.raw()) };
        Ok(())
    }
}

/// The engine does not run a destructor for hook state; both the explicit
/// clear path and connection close come through here.
pub(crate) unsafe fn clear_update_hook_ptr(raw: *mut ffi::sqlite3) {
    let old = ffi::sqlite3_update_hook(raw, None, std::ptr::null_mut());
    if !old.is_null() {
        drop(Box::from_raw(old.cast::<HookContainer>()));
    }
}

unsafe extern "C" fn update_hook_cb(
    data: *mut c_void,
    op: c_int,
    _db_name: *const c_char,
    table_name: *const c_char,
    rowid: i64,
) {
    let table = std::ffi::CStr::from_ptr(table_name).to_string_lossy();
    let op = match op {
        ffi::SQLITE_INSERT => Op::Insert,
        ffi::SQLITE_UPDATE => Op::Update,
        ffi::SQLITE_DELETE => Op::Delete,
        other => unreachable!("unknown update-hook opcode {other}"),
    };

    let container = &mut *data.cast::<HookContainer>();
    if catch_unwind(AssertUnwindSafe(|| (container.cb)(op, &table, rowid))).is_err() {
        tracing::error!(table = %table, rowid, "update hook panicked; change notification dropped");
    }
}
