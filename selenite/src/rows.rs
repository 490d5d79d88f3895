use std::sync::Arc;

use crate::statement::Statement;
use crate::value::{FromValue, ValueError};
use crate::{Error, Result, Value};

/// Descriptor of one result column, recorded at prepare time.
#[derive(Clone, Debug)]
pub struct Column {
    pub(crate) name: String,
    pub(crate) decl_type: Option<String>,
    pub(crate) table_name: Option<String>,
}

impl Column {
    /// Column name, with the case the engine returned.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type of the column, if it comes from a table definition.
    pub fn decl_type(&self) -> Option<&str> {
        self.decl_type.as_deref()
    }

    /// Source table, absent for expression and literal columns.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }
}

/// Origin of a result column as reported by the engine's column-metadata
/// entry points. All fields are absent for expression and literal columns.
#[derive(Clone, Debug, Default)]
pub struct ColumnMetadata {
    pub database: Option<String>,
    pub table: Option<String>,
    pub origin_name: Option<String>,
}

/// One fully materialized result row.
///
/// Values are copied out of engine-owned buffers during the step that
/// produced them, so a `Row` stays valid after the statement is reset or
/// finalized.
#[derive(Clone, Debug)]
pub struct Row {
    pub(crate) columns: Arc<Vec<Column>>,
    pub(crate) values: Vec<Value>,
}

impl Row {
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Case-insensitive lookup by column name (ASCII folding).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.values.get(idx)
    }

    /// Typed extraction by index.
    pub fn get_as<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| Error::ColumnNotFound(idx.to_string()))?;
        T::from_value(value).map_err(|e| value_error_for_column(e, self.column_name(idx)))
    }

    /// Typed extraction by case-insensitive column name.
    pub fn get_by_name_as<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))?;
        self.get_as(idx)
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(|c| c.name.as_str())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.as_bytes().eq_ignore_ascii_case(name.as_bytes()))
    }
}

pub(crate) fn value_error_for_column(e: ValueError, column: Option<&str>) -> Error {
    let column = column.unwrap_or("?").to_string();
    match e {
        ValueError::Null => Error::NullColumn(column),
        ValueError::TypeMismatch { expected, actual } => Error::TypeMismatch { expected, actual },
        ValueError::OutOfRange => Error::TypeMismatch {
            expected: "integer in range",
            actual: "integer",
        },
    }
}

/// Streaming query results. Each call to [`next`](Rows::next) steps the
/// statement once and copies the current row out.
pub struct Rows<'stmt> {
    pub(crate) stmt: &'stmt mut Statement,
}

impl Rows<'_> {
    pub fn next(&mut self) -> Result<Option<Row>> {
        if self.stmt.step()? {
            Ok(Some(self.stmt.current_row()?))
        } else {
            Ok(None)
        }
    }

    pub fn column_count(&self) -> usize {
        self.stmt.column_count()
    }

    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.stmt.column_name(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row {
            columns: Arc::new(vec![
                Column {
                    name: "Id".to_string(),
                    decl_type: Some("INTEGER".to_string()),
                    table_name: Some("users".to_string()),
                },
                Column {
                    name: "name".to_string(),
                    decl_type: Some("TEXT".to_string()),
                    table_name: Some("users".to_string()),
                },
            ]),
            values: vec![Value::Integer(1), Value::Text("Alice".to_string())],
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let row = sample_row();
        assert_eq!(row.get_by_name("ID"), Some(&Value::Integer(1)));
        assert_eq!(row.get_by_name("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&Value::Text("Alice".into())));
        assert!(row.get_by_name("missing").is_none());
    }

    #[test]
    fn typed_extraction_errors() {
        let row = sample_row();
        assert_eq!(row.get_as::<i64>(0).unwrap(), 1);
        assert!(matches!(
            row.get_as::<i64>(1),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            row.get_as::<i64>(9),
            Err(Error::ColumnNotFound(_))
        ));
        assert!(matches!(
            row.get_by_name_as::<String>("nope"),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn names_preserve_case() {
        let row = sample_row();
        assert_eq!(row.column_names(), vec!["Id", "name"]);
    }
}
