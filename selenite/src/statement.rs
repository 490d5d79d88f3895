use std::ffi::c_int;
use std::sync::Arc;

use crate::connection::Connection;
use crate::errors;
use crate::params::Params;
use crate::rows::{Column, ColumnMetadata, Row, Rows};
use crate::value::{IntoValue, ValueRef};
use crate::{Error, Result, Value};

/// Cursor state of a prepared statement.
///
/// `Idle` is the prepared-but-not-stepped state; a step either yields a row
/// (`Rows`) or exhausts the statement (`Done`). A step error moves the
/// statement to `Poisoned`, from which only finalize is permitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StepState {
    Idle,
    Rows,
    Done,
    Poisoned,
}

/// A prepared statement.
///
/// Bindings are side state that survives [`reset`](Statement::reset);
/// [`clear_bindings`](Statement::clear_bindings) zeroes them explicitly.
/// Finalize is idempotent and also runs on drop.
#[derive(Debug)]
pub struct Statement {
    conn: Connection,
    inner: selenite_sys::Statement,
    columns: Arc<Vec<Column>>,
    state: StepState,
}

impl Statement {
    pub(crate) fn prepare(conn: Connection, sql: &str) -> Result<Statement> {
        let raw = conn.raw();
        let inner = match unsafe { selenite_sys::prepare_stmt(raw, sql) } {
            Ok(stmt) => stmt,
            Err(selenite_sys::Error::LibError(_)) => {
                return Err(Error::SqliteFailure(
                    errors::extended_error_code(raw),
                    errors::error_from_handle(raw),
                ))
            }
            Err(err) => {
                return Err(Error::Misuse(format!(
                    "Unexpected error while preparing statement: {err}"
                )))
            }
        };
        if inner.raw_stmt.is_null() {
            // Empty input or a comment prepares to a NULL statement.
            return Err(Error::Misuse(
                "the SQL input contains no statement".to_string(),
            ));
        }

        let n = inner.column_count();
        let mut columns = Vec::with_capacity(n as usize);
        for i in 0..n {
            columns.push(Column {
                name: inner
                    .column_name(i)
                    .expect("column idx should be valid")
                    .to_string(),
                decl_type: inner.column_decltype(i).map(str::to_string),
                table_name: inner.column_table_name(i).map(str::to_string),
            });
        }

        Ok(Statement {
            conn,
            inner,
            columns: Arc::new(columns),
            state: StepState::Idle,
        })
    }

    fn check_usable(&self) -> Result<()> {
        if self.state == StepState::Poisoned {
            return Err(Error::Misuse(
                "statement has errored; only finalize is permitted".to_string(),
            ));
        }
        if self.inner.is_finalized() {
            return Err(Error::ClosedHandle("statement"));
        }
        self.conn.ensure_open()
    }

    fn check_bind(&self, idx: i32, rc: c_int) -> Result<()> {
        if rc == selenite_sys::ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::Bind(format!(
                "parameter {idx}: {}",
                errors::error_from_code(rc)
            )))
        }
    }

    pub fn bind_null(&mut self, idx: i32) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_null(idx))
    }

    pub fn bind_int(&mut self, idx: i32, value: i64) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_int64(idx, value))
    }

    pub fn bind_double(&mut self, idx: i32, value: f64) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_double(idx, value))
    }

    pub fn bind_text(&mut self, idx: i32, value: &str) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_text(idx, value.as_bytes()))
    }

    pub fn bind_blob(&mut self, idx: i32, value: &[u8]) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_blob(idx, value))
    }

    /// Binds a zero-filled BLOB of the given length, as a placeholder for
    /// incremental BLOB I/O.
    pub fn bind_zeroblob(&mut self, idx: i32, len: i32) -> Result<()> {
        self.check_usable()?;
        self.check_bind(idx, self.inner.bind_zeroblob(idx, len))
    }

    /// Binds a [`Value`] by dispatching on its variant. Text and blob
    /// payloads are copied into engine-owned storage.
    pub fn bind_value(&mut self, idx: i32, value: &Value) -> Result<()> {
        self.check_usable()?;
        let rc = match ValueRef::from(value) {
            ValueRef::Null => self.inner.bind_null(idx),
            ValueRef::Integer(i) => self.inner.bind_int64(idx, i),
            ValueRef::Real(r) => self.inner.bind_double(idx, r),
            ValueRef::Text(s) => self.inner.bind_text(idx, s),
            ValueRef::Blob(b) => self.inner.bind_blob(idx, b),
        };
        self.check_bind(idx, rc)
    }

    /// Binds any host type with an [`IntoValue`] conversion.
    pub fn bind_typed<T: IntoValue>(&mut self, idx: i32, value: T) -> Result<()> {
        let value = value.into_value()?;
        self.bind_value(idx, &value)
    }

    /// Resolves a named parameter (`:name`, `@name` or `$name`, sigil
    /// included) to its one-based index.
    pub fn parameter_index(&self, name: &str) -> Result<i32> {
        match self.inner.bind_parameter_index(name) {
            0 => Err(Error::Bind(format!("unknown parameter name: `{name}`"))),
            i => Ok(i),
        }
    }

    pub fn bind_named(&mut self, name: &str, value: &Value) -> Result<()> {
        let idx = self.parameter_index(name)?;
        self.bind_value(idx, value)
    }

    /// Binds `values` at positions `1..=values.len()`.
    pub fn bind_all(&mut self, values: &[Value]) -> Result<()> {
        for (i, value) in values.iter().enumerate() {
            self.bind_value(i as i32 + 1, value)?;
        }
        Ok(())
    }

    pub fn bind_all_named(&mut self, pairs: &[(String, Value)]) -> Result<()> {
        for (name, value) in pairs {
            self.bind_named(name, value)?;
        }
        Ok(())
    }

    pub fn bind(&mut self, params: &Params) -> Result<()> {
        match params {
            Params::None => Ok(()),
            Params::Positional(values) => self.bind_all(values),
            Params::Named(pairs) => self.bind_all_named(pairs),
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.bind_parameter_count()
    }

    pub fn parameter_name(&self, index: i32) -> Option<&str> {
        self.inner.bind_parameter_name(index)
    }

    /// Zeroes all bindings. Distinct from [`reset`](Statement::reset), which
    /// leaves bindings in place.
    pub fn clear_bindings(&mut self) -> Result<()> {
        self.check_usable()?;
        self.inner.clear_bindings();
        Ok(())
    }

    /// Advances the cursor. Returns `true` while rows are available.
    ///
    /// A step that errors poisons the statement; only
    /// [`finalize`](Statement::finalize) is permitted afterwards.
    pub fn step(&mut self) -> Result<bool> {
        self.check_usable()?;
        if self.state == StepState::Done {
            return Ok(false);
        }
        match self.inner.step() {
            selenite_sys::ffi::SQLITE_ROW => {
                self.state = StepState::Rows;
                Ok(true)
            }
            selenite_sys::ffi::SQLITE_DONE => {
                self.state = StepState::Done;
                Ok(false)
            }
            _ => {
                self.state = StepState::Poisoned;
                Err(self.conn.error_out())
            }
        }
    }

    /// Returns the cursor to `Idle`. Bindings survive.
    pub fn reset(&mut self) -> Result<()> {
        self.check_usable()?;
        // The reset return code repeats the last step error, which has
        // already been surfaced.
        self.inner.reset();
        self.state = StepState::Idle;
        Ok(())
    }

    /// Releases the engine-side statement. Idempotent; also runs on drop.
    pub fn finalize(&mut self) -> Result<()> {
        self.inner.finalize();
        Ok(())
    }

    /// Copies the current row out of the engine. Valid only after a step
    /// returned `true`.
    pub(crate) fn current_row(&self) -> Result<Row> {
        if self.state != StepState::Rows {
            return Err(Error::Misuse("no row is available".to_string()));
        }
        let n = self.columns.len();
        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            let i = i as i32;
            let value = match self.inner.column_type(i) {
                selenite_sys::ffi::SQLITE_NULL => Value::Null,
                selenite_sys::ffi::SQLITE_INTEGER => Value::Integer(self.inner.column_int64(i)),
                selenite_sys::ffi::SQLITE_FLOAT => Value::Real(self.inner.column_double(i)),
                selenite_sys::ffi::SQLITE_TEXT => {
                    Value::Text(String::from_utf8_lossy(self.inner.column_text(i)).to_string())
                }
                selenite_sys::ffi::SQLITE_BLOB => Value::Blob(self.inner.column_blob(i).to_vec()),
                other => unreachable!("unknown column type {} at index {}", other, i),
            };
            values.push(value);
        }
        Ok(Row {
            columns: self.columns.clone(),
            values,
        })
    }

    /// Binds `params` and returns a streaming row iterator. The statement is
    /// reset first if it has been stepped before.
    pub fn query(&mut self, params: impl crate::params::IntoParams) -> Result<Rows<'_>> {
        if self.state != StepState::Idle {
            self.reset()?;
        }
        let params = params.into_params()?;
        self.bind(&params)?;
        Ok(Rows { stmt: self })
    }

    /// Binds `params` and runs the statement to completion, returning the
    /// change count. Errors with [`Error::ExecuteReturnedRows`] if the
    /// statement produces rows.
    pub fn execute(&mut self, params: impl crate::params::IntoParams) -> Result<u64> {
        if self.state != StepState::Idle {
            self.reset()?;
        }
        let params = params.into_params()?;
        self.bind(&params)?;
        if self.step()? {
            return Err(Error::ExecuteReturnedRows);
        }
        Ok(self.conn.changes())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(|c| c.name.as_str())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case-insensitive column index lookup.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_bytes().eq_ignore_ascii_case(name.as_bytes()))
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Origin of a result column. All fields are absent for expression and
    /// literal columns; availability requires the engine's column-metadata
    /// feature, which the bundled build enables.
    pub fn column_metadata(&self, idx: usize) -> ColumnMetadata {
        let idx = idx as i32;
        ColumnMetadata {
            database: self.inner.column_database_name(idx).map(str::to_string),
            table: self.inner.column_table_name(idx).map(str::to_string),
            origin_name: self.inner.column_origin_name(idx).map(str::to_string),
        }
    }

    /// Whether the statement makes no direct changes to the database.
    pub fn readonly(&self) -> bool {
        self.inner.readonly()
    }
}
