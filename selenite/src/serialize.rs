//! Whole-database snapshots in the engine's on-disk format.

use std::ffi::c_void;

use bytes::Bytes;

use selenite_sys::ffi;

use crate::connection::{Connection, DatabaseName};
use crate::{Error, Result};

impl Connection {
    /// Snapshot the `main` database as a byte sequence in the engine's
    /// on-disk format (100-byte header included). A schema that has never
    /// been written yields an empty sequence.
    pub fn serialize(&self) -> Result<Bytes> {
        self.serialize_with_name(DatabaseName::Main)
    }

    pub fn serialize_with_name(&self, schema: DatabaseName<'_>) -> Result<Bytes> {
        self.ensure_open()?;
        let c_schema = schema.as_cstring()?;
        let mut size: ffi::sqlite3_int64 = 0;
        let ptr = unsafe { ffi::sqlite3_serialize(self.raw(), c_schema.as_ptr(), &mut size, 0) };
        if ptr.is_null() {
            if size == 0 {
                return Ok(Bytes::new());
            }
            return Err(Error::SqliteFailure(
                ffi::SQLITE_NOMEM,
                crate::errors::error_from_code(ffi::SQLITE_NOMEM),
            ));
        }
        let bytes = {
            let slice = unsafe { std::slice::from_raw_parts(ptr as *const u8, size as usize) };
            Bytes::copy_from_slice(slice)
        };
        unsafe { ffi::sqlite3_free(ptr.cast::<c_void>()) };
        Ok(bytes)
    }

    /// Replace the `main` database content with `data`, which must be a
    /// serialized database image. With `read_only`, subsequent writes fail
    /// with the engine's read-only code.
    pub fn deserialize_into(&self, data: &[u8], read_only: bool) -> Result<()> {
        self.deserialize_into_with_name(DatabaseName::Main, data, read_only)
    }

    pub fn deserialize_into_with_name(
        &self,
        schema: DatabaseName<'_>,
        data: &[u8],
        read_only: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        let c_schema = schema.as_cstring()?;

        // Duplicate into engine-allocated memory so the engine's
        // free-on-close semantics apply to the buffer.
        let len = data.len();
        let buf = unsafe { ffi::sqlite3_malloc64(len.max(1) as u64) }.cast::<u8>();
        if buf.is_null() {
            return Err(Error::SqliteFailure(
                ffi::SQLITE_NOMEM,
                crate::errors::error_from_code(ffi::SQLITE_NOMEM),
            ));
        }
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), buf, len) };

        let mut flags = ffi::SQLITE_DESERIALIZE_FREEONCLOSE as std::ffi::c_uint;
        if read_only {
            flags |= ffi::SQLITE_DESERIALIZE_READONLY as std::ffi::c_uint;
        } else {
            flags |= ffi::SQLITE_DESERIALIZE_RESIZEABLE as std::ffi::c_uint;
        }

        let rc = unsafe {
            ffi::sqlite3_deserialize(
                self.raw(),
                c_schema.as_ptr(),
                buf,
                len as ffi::sqlite3_int64,
                len.max(1) as ffi::sqlite3_int64,
                flags,
            )
        };
        self.decode_result(rc)
    }

    /// A fully independent in-memory copy of this connection's database:
    /// mutations on either side do not affect the other.
    pub fn clone_to_memory(&self) -> Result<Connection> {
        let image = self.serialize()?;
        let copy = Connection::open_memory()?;
        if !image.is_empty() {
            copy.deserialize_into(&image, false)?;
        }
        Ok(copy)
    }
}
