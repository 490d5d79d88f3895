//! Mutable in-memory virtual table.
//!
//! An [`ArrayTable`] owns a sequence of rows addressed by auto-incrementing
//! rowids. The same table can be mutated from SQL (INSERT/UPDATE/DELETE go
//! through the module's update path) and from the host through the handle,
//! which shares the row store with every registered clone.
//!
//! # Example
//!
//! ```rust,no_run
//! # use selenite::{Connection, Result, Value};
//! # use selenite::vtab::{array::ArrayTable, SchemaColumn};
//! fn example(db: &Connection) -> Result<()> {
//!     let table = ArrayTable::new(vec![
//!         SchemaColumn::new("id", "INTEGER"),
//!         SchemaColumn::new("name", "TEXT"),
//!     ]);
//!     db.create_module("people", table.clone())?;
//!     db.exec_raw("CREATE VIRTUAL TABLE people USING people")?;
//!     table.insert(vec![Value::Integer(1), Value::Text("Alice".into())]);
//!     db.execute("INSERT INTO people (id, name) VALUES (2, 'Bob')", ())?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::vtab::{SchemaColumn, TableSchema, VTabChange, VTabCursor, VTabModule};
use crate::{Error, Result, Value};

#[derive(Clone, Debug)]
struct ArrayRow {
    rowid: i64,
    values: Vec<Value>,
}

#[derive(Debug)]
struct ArrayInner {
    rows: Vec<ArrayRow>,
    next_rowid: i64,
}

/// A mutable in-memory table. Cloning shares the row store, so the handle
/// kept by the host and the copy registered as a module see the same data.
#[derive(Clone)]
pub struct ArrayTable {
    columns: Arc<Vec<SchemaColumn>>,
    inner: Arc<Mutex<ArrayInner>>,
}

impl ArrayTable {
    pub fn new(columns: Vec<SchemaColumn>) -> ArrayTable {
        ArrayTable {
            columns: Arc::new(columns),
            inner: Arc::new(Mutex::new(ArrayInner {
                rows: Vec::new(),
                next_rowid: 1,
            })),
        }
    }

    /// Append a row, assigning the next rowid. Returns the assigned rowid.
    pub fn insert(&self, values: Vec<Value>) -> i64 {
        let mut inner = self.inner.lock();
        let rowid = inner.next_rowid;
        inner.next_rowid += 1;
        inner.rows.push(ArrayRow { rowid, values });
        rowid
    }

    /// Replace the values of the row with the given rowid. Returns whether a
    /// row matched.
    pub fn update_row(&self, rowid: i64, values: Vec<Value>) -> bool {
        let mut inner = self.inner.lock();
        match inner.rows.iter_mut().find(|r| r.rowid == rowid) {
            Some(row) => {
                row.values = values;
                true
            }
            None => false,
        }
    }

    /// Remove the row with the given rowid. Returns whether a row matched.
    pub fn delete_row(&self, rowid: i64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.rows.len();
        inner.rows.retain(|r| r.rowid != rowid);
        inner.rows.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<ArrayRow> {
        self.inner.lock().rows.clone()
    }
}

impl VTabModule for ArrayTable {
    fn schema(&self) -> TableSchema {
        TableSchema::new(self.columns.as_ref().clone())
    }

    fn open(
        &self,
        _idx_num: i32,
        _idx_str: Option<&str>,
        _args: &[Value],
    ) -> Result<Box<dyn VTabCursor>> {
        // The cursor iterates a snapshot captured at filter time, so
        // modifications during a scan do not shift cursor positions.
        Ok(Box::new(ArrayCursor {
            rows: self.snapshot(),
            pos: 0,
        }))
    }

    fn update(&self, change: VTabChange) -> Result<Option<i64>> {
        let mut inner = self.inner.lock();
        match change {
            VTabChange::Delete(rowid) => {
                inner.rows.retain(|r| r.rowid != rowid);
                Ok(None)
            }
            VTabChange::Insert { rowid, values } => {
                let rowid = match rowid {
                    Some(rowid) => {
                        if rowid >= inner.next_rowid {
                            inner.next_rowid = rowid + 1;
                        }
                        rowid
                    }
                    None => {
                        let rowid = inner.next_rowid;
                        inner.next_rowid += 1;
                        rowid
                    }
                };
                inner.rows.push(ArrayRow { rowid, values });
                Ok(Some(rowid))
            }
            VTabChange::Update {
                rowid,
                new_rowid,
                values,
            } => match inner.rows.iter_mut().find(|r| r.rowid == rowid) {
                Some(row) => {
                    row.rowid = new_rowid;
                    row.values = values;
                    Ok(None)
                }
                None => Err(Error::Misuse(format!("no row with rowid {rowid}"))),
            },
        }
    }
}

struct ArrayCursor {
    rows: Vec<ArrayRow>,
    pos: usize,
}

impl VTabCursor for ArrayCursor {
    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn column(&self, idx: usize) -> Result<Value> {
        let row = &self.rows[self.pos];
        Ok(row.values.get(idx).cloned().unwrap_or(Value::Null))
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.rows[self.pos].rowid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ArrayTable {
        ArrayTable::new(vec![
            SchemaColumn::new("id", "INTEGER"),
            SchemaColumn::new("name", "TEXT"),
        ])
    }

    #[test]
    fn host_side_mutation() {
        let t = table();
        let r1 = t.insert(vec![Value::Integer(1), Value::Text("Alice".into())]);
        let r2 = t.insert(vec![Value::Integer(2), Value::Text("Bob".into())]);
        assert_eq!((r1, r2), (1, 2));
        assert_eq!(t.len(), 2);

        assert!(t.update_row(r1, vec![Value::Integer(1), Value::Text("Alice2".into())]));
        assert!(!t.update_row(99, vec![]));

        assert!(t.delete_row(r2));
        assert!(!t.delete_row(r2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn sql_insert_assigns_rowids_after_explicit_one() {
        let t = table();
        let assigned = t
            .update(VTabChange::Insert {
                rowid: Some(10),
                values: vec![Value::Integer(1), Value::Null],
            })
            .unwrap();
        assert_eq!(assigned, Some(10));
        let next = t
            .update(VTabChange::Insert {
                rowid: None,
                values: vec![Value::Integer(2), Value::Null],
            })
            .unwrap();
        assert_eq!(next, Some(11));
    }

    #[test]
    fn cursor_iterates_a_snapshot() {
        let t = table();
        t.insert(vec![Value::Integer(1), Value::Null]);
        t.insert(vec![Value::Integer(2), Value::Null]);

        let mut cursor = t.open(0, None, &[]).unwrap();
        // Mutations after filter time are invisible to this cursor.
        t.insert(vec![Value::Integer(3), Value::Null]);

        let mut seen = Vec::new();
        while !cursor.eof() {
            seen.push(cursor.rowid().unwrap());
            cursor.next().unwrap();
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(t.len(), 3);
    }
}
