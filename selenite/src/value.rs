use std::str::FromStr;

use crate::{Error, Result};

/// An owned SQLite value.
///
/// Every engine-side cell or argument maps to exactly one variant. Text and
/// blob payloads are copied out of engine-owned buffers, so a `Value` stays
/// valid across statement resets.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Integer = 1,
    Real,
    Text,
    Blob,
    Null,
}

impl FromStr for ValueType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<ValueType, Self::Err> {
        match s {
            "TEXT" => Ok(ValueType::Text),
            "INTEGER" => Ok(ValueType::Integer),
            "BLOB" => Ok(ValueType::Blob),
            "NULL" => Ok(ValueType::Null),
            "REAL" => Ok(ValueType::Real),
            _ => Err(()),
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Returns `true` if the value is [`Null`].
    ///
    /// [`Null`]: Value::Null
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_integer(&self) -> Option<&i64> {
        if let Self::Integer(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_real(&self) -> Option<&f64> {
        if let Self::Real(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_text(&self) -> Option<&String> {
        if let Self::Text(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_blob(&self) -> Option<&Vec<u8>> {
        if let Self::Blob(v) = self {
            Some(v)
        } else {
            None
        }
    }
}

/// Payload equality. Two NaN reals compare equal so round-tripped rows can be
/// compared deterministically in tests.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Value {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Value {
        Value::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Value {
        Value::Integer(value as i64)
    }
}

impl TryFrom<u64> for Value {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Value> {
        if value > i64::MAX as u64 {
            Err(Error::ToSqlConversionFailure(
                "u64 is too large to fit in an i64".into(),
            ))
        } else {
            Ok(Value::Integer(value as i64))
        }
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Value {
        Value::Real(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Value {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Value {
        Value::Blob(value.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Value {
        Value::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Value {
        Value::Integer(value as i64)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl From<selenite_sys::Value> for Value {
    fn from(value: selenite_sys::Value) -> Value {
        match value.value_type() {
            selenite_sys::ValueType::Null => Value::Null,
            selenite_sys::ValueType::Integer => Value::Integer(value.int64()),
            selenite_sys::ValueType::Real => Value::Real(value.double()),
            selenite_sys::ValueType::Text => {
                // Read the byte count alongside the pointer; text may contain
                // embedded NULs.
                let (ptr, len) = (value.text(), value.bytes());
                if ptr.is_null() {
                    Value::Null
                } else {
                    let bytes = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
                    Value::Text(String::from_utf8_lossy(bytes).to_string())
                }
            }
            selenite_sys::ValueType::Blob => {
                let (ptr, len) = (value.blob(), value.bytes());

                assert!(len >= 0, "unexpected negative bytes value from sqlite3");

                if len > 0 {
                    let slice =
                        unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) };
                    Value::Blob(slice.to_vec())
                } else {
                    Value::Blob(Vec::new())
                }
            }
        }
    }
}

/// Borrowed counterpart of [`Value`], used on the binding path so text and
/// blob payloads are not copied before the engine duplicates them.
pub enum ValueRef<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a [u8]),
    Blob(&'a [u8]),
}

impl ValueRef<'_> {
    pub fn data_type(&self) -> ValueType {
        match *self {
            ValueRef::Null => ValueType::Null,
            ValueRef::Integer(_) => ValueType::Integer,
            ValueRef::Real(_) => ValueType::Real,
            ValueRef::Text(_) => ValueType::Text,
            ValueRef::Blob(_) => ValueType::Blob,
        }
    }
}

impl<'a> From<&'a Value> for ValueRef<'a> {
    fn from(v: &'a Value) -> ValueRef<'a> {
        match *v {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(i),
            Value::Real(r) => ValueRef::Real(r),
            Value::Text(ref s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(ref b) => ValueRef::Blob(b),
        }
    }
}

/// Conversion of a host type into a [`Value`] for binding.
pub trait IntoValue {
    fn into_value(self) -> Result<Value>;
}

impl<T> IntoValue for T
where
    T: TryInto<Value>,
    T::Error: Into<crate::BoxError>,
{
    fn into_value(self) -> Result<Value> {
        self.try_into()
            .map_err(|e| Error::ToSqlConversionFailure(e.into()))
    }
}

/// Why a typed extraction failed. Row accessors translate these into the
/// crate error type with the column name attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueError {
    /// The cell was NULL and the target type has no way to express it.
    Null,
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// An integer cell does not fit the target type.
    OutOfRange,
}

/// Typed extraction of a host type out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Null => Err(ValueError::Null),
            other => Err(ValueError::TypeMismatch {
                expected: "integer",
                actual: other.type_name(),
            }),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        let i = i64::from_value(value)?;
        i32::try_from(i).map_err(|_| ValueError::OutOfRange)
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        let i = i64::from_value(value)?;
        u32::try_from(i).map_err(|_| ValueError::OutOfRange)
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        let i = i64::from_value(value)?;
        u64::try_from(i).map_err(|_| ValueError::OutOfRange)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Real(f) => Ok(*f),
            // Integer cells widen to real; this is the one numeric coercion a
            // typed extractor opts into.
            Value::Integer(i) => Ok(*i as f64),
            Value::Null => Err(ValueError::Null),
            other => Err(ValueError::TypeMismatch {
                expected: "real",
                actual: other.type_name(),
            }),
        }
    }
}

/// Liberal SQL boolean: 0 is false, any other integer is true, NULL is false.
/// Text is never coerced.
impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Integer(i) => Ok(*i != 0),
            Value::Null => Ok(false),
            other => Err(ValueError::TypeMismatch {
                expected: "integer",
                actual: other.type_name(),
            }),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Null => Err(ValueError::Null),
            other => Err(ValueError::TypeMismatch {
                expected: "text",
                actual: other.type_name(),
            }),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            Value::Null => Err(ValueError::Null),
            other => Err(ValueError::TypeMismatch {
                expected: "blob",
                actual: other.type_name(),
            }),
        }
    }
}

impl<T> FromValue for Option<T>
where
    T: FromValue,
{
    fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_reals_compare_equal() {
        assert_eq!(Value::Real(f64::NAN), Value::Real(f64::NAN));
        assert_ne!(Value::Real(f64::NAN), Value::Real(1.0));
        assert_eq!(Value::Real(2.5), Value::Real(2.5));
    }

    #[test]
    fn variant_mismatch_is_unequal() {
        assert_ne!(Value::Integer(1), Value::Real(1.0));
        assert_ne!(Value::Text("1".into()), Value::Integer(1));
        assert_eq!(Value::Blob(vec![]), Value::Blob(vec![]));
    }

    #[test]
    fn liberal_bool_extraction() {
        assert!(!bool::from_value(&Value::Null).unwrap());
        assert!(!bool::from_value(&Value::Integer(0)).unwrap());
        assert!(bool::from_value(&Value::Integer(7)).unwrap());
        assert!(bool::from_value(&Value::Integer(-1)).unwrap());
        assert!(bool::from_value(&Value::Text("true".into())).is_err());
    }

    #[test]
    fn optional_extraction_maps_null_to_none() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::Integer(3)).unwrap(),
            Some(3)
        );
        assert!(i64::from_value(&Value::Null).is_err());
    }

    #[test]
    fn out_of_range_integer() {
        assert_eq!(
            i32::from_value(&Value::Integer(i64::MAX)),
            Err(ValueError::OutOfRange)
        );
    }
}
