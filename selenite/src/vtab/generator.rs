//! Read-only generator virtual table.
//!
//! A [`Generator`] produces a lazy sequence of rows from four host callbacks:
//! `init` seeds the state, `has_more` decides end-of-scan, `current` renders
//! the row for the present state and `advance` produces the next state. Row
//! identifiers auto-increment from 1 unless a custom `rowid` callback is
//! installed. Writes fail with a read-only error.
//!
//! # Example
//!
//! ```rust,no_run
//! # use selenite::{Connection, Result, Value};
//! # use selenite::vtab::{generator::Generator, SchemaColumn};
//! fn example(db: &Connection) -> Result<()> {
//!     let counter = Generator::new(
//!         vec![SchemaColumn::new("value", "INTEGER")],
//!         || 1i64,
//!         |n| *n <= 10,
//!         |n| vec![Value::Integer(*n)],
//!         |n| n + 1,
//!     );
//!     db.create_module("counter", counter)?;
//!     db.exec_raw("CREATE VIRTUAL TABLE counter USING counter")?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::vtab::{SchemaColumn, TableSchema, VTabCursor, VTabModule};
use crate::{Error, Result, Value};

/// A read-only lazy sequence exposed as a virtual table.
pub struct Generator<S> {
    columns: Vec<SchemaColumn>,
    init: Arc<dyn Fn() -> S + Send + Sync>,
    has_more: Arc<dyn Fn(&S) -> bool + Send + Sync>,
    current: Arc<dyn Fn(&S) -> Vec<Value> + Send + Sync>,
    advance: Arc<dyn Fn(S) -> S + Send + Sync>,
    rowid: Option<Arc<dyn Fn(&S) -> i64 + Send + Sync>>,
}

impl<S: Send + 'static> Generator<S> {
    pub fn new(
        columns: Vec<SchemaColumn>,
        init: impl Fn() -> S + Send + Sync + 'static,
        has_more: impl Fn(&S) -> bool + Send + Sync + 'static,
        current: impl Fn(&S) -> Vec<Value> + Send + Sync + 'static,
        advance: impl Fn(S) -> S + Send + Sync + 'static,
    ) -> Generator<S> {
        Generator {
            columns,
            init: Arc::new(init),
            has_more: Arc::new(has_more),
            current: Arc::new(current),
            advance: Arc::new(advance),
            rowid: None,
        }
    }

    /// Override the auto-assigned row identifier.
    pub fn with_rowid(mut self, rowid: impl Fn(&S) -> i64 + Send + Sync + 'static) -> Generator<S> {
        self.rowid = Some(Arc::new(rowid));
        self
    }
}

impl<S: Send + 'static> VTabModule for Generator<S> {
    fn schema(&self) -> TableSchema {
        TableSchema::new(self.columns.clone())
    }

    fn open(
        &self,
        _idx_num: i32,
        _idx_str: Option<&str>,
        _args: &[Value],
    ) -> Result<Box<dyn VTabCursor>> {
        let state = (self.init)();
        let at_eof = !(self.has_more)(&state);
        Ok(Box::new(GeneratorCursor {
            state: Some(state),
            has_more: self.has_more.clone(),
            current: self.current.clone(),
            advance: self.advance.clone(),
            rowid: self.rowid.clone(),
            auto_rowid: 1,
            at_eof,
        }))
    }
}

struct GeneratorCursor<S> {
    state: Option<S>,
    has_more: Arc<dyn Fn(&S) -> bool + Send + Sync>,
    current: Arc<dyn Fn(&S) -> Vec<Value> + Send + Sync>,
    advance: Arc<dyn Fn(S) -> S + Send + Sync>,
    rowid: Option<Arc<dyn Fn(&S) -> i64 + Send + Sync>>,
    auto_rowid: i64,
    at_eof: bool,
}

impl<S: Send + 'static> VTabCursor for GeneratorCursor<S> {
    fn eof(&self) -> bool {
        self.at_eof
    }

    fn next(&mut self) -> Result<()> {
        let state = self
            .state
            .take()
            .ok_or_else(|| Error::Misuse("generator cursor has no state".to_string()))?;
        let next = (self.advance)(state);
        self.at_eof = !(self.has_more)(&next);
        self.state = Some(next);
        self.auto_rowid += 1;
        Ok(())
    }

    fn column(&self, idx: usize) -> Result<Value> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::Misuse("generator cursor has no state".to_string()))?;
        let row = (self.current)(state);
        Ok(row.get(idx).cloned().unwrap_or(Value::Null))
    }

    fn rowid(&self) -> Result<i64> {
        match (&self.rowid, &self.state) {
            (Some(rowid), Some(state)) => Ok(rowid(state)),
            _ => Ok(self.auto_rowid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(limit: i64) -> Generator<i64> {
        Generator::new(
            vec![SchemaColumn::new("value", "INTEGER")],
            move || 1i64,
            move |n| *n <= limit,
            |n| vec![Value::Integer(*n)],
            |n| n + 1,
        )
    }

    #[test]
    fn iterates_to_exhaustion() {
        let generator = counter(3);
        let mut cursor = generator.open(0, None, &[]).unwrap();
        let mut seen = Vec::new();
        while !cursor.eof() {
            seen.push(cursor.column(0).unwrap());
            cursor.next().unwrap();
        }
        assert_eq!(
            seen,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn empty_sequence_is_eof_at_open() {
        let generator = counter(0);
        let cursor = generator.open(0, None, &[]).unwrap();
        assert!(cursor.eof());
    }

    #[test]
    fn custom_rowid_overrides_auto() {
        let generator = counter(2).with_rowid(|n| n * 100);
        let mut cursor = generator.open(0, None, &[]).unwrap();
        assert_eq!(cursor.rowid().unwrap(), 100);
        cursor.next().unwrap();
        assert_eq!(cursor.rowid().unwrap(), 200);
    }

    #[test]
    fn writes_are_rejected() {
        let generator = counter(2);
        let err = generator
            .update(crate::vtab::VTabChange::Delete(1))
            .unwrap_err();
        assert!(matches!(err, Error::ReadOnly));
    }
}
