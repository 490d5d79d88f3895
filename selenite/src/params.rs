//! Parameter passing for prepared statements.

use crate::value::IntoValue;
use crate::{Result, Value};

mod sealed {
    pub trait Sealed {}
}

use sealed::Sealed;

/// Converts some type into parameters that can be bound to a statement.
///
/// The trait is sealed; use the provided implementations:
///
/// - `()` for no parameters
/// - tuples of up to eight heterogeneous values: `(1, "foo")`
/// - `params![..]` / `named_params! {..}` for longer heterogeneous lists
/// - arrays and `Vec`s for homogeneous lists
/// - arrays of `(&str, T)` pairs for named parameters
pub trait IntoParams: Sealed {
    #[doc(hidden)]
    fn into_params(self) -> Result<Params>;
}

#[derive(Debug, Clone)]
pub enum Params {
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Sealed for () {}
impl IntoParams for () {
    fn into_params(self) -> Result<Params> {
        Ok(Params::None)
    }
}

impl Sealed for Params {}
impl IntoParams for Params {
    fn into_params(self) -> Result<Params> {
        Ok(self)
    }
}

impl<T: IntoValue> Sealed for Vec<T> {}
impl<T: IntoValue> IntoParams for Vec<T> {
    fn into_params(self) -> Result<Params> {
        let values = self
            .into_iter()
            .map(|v| v.into_value())
            .collect::<Result<Vec<_>>>()?;

        Ok(Params::Positional(values))
    }
}

impl<T: IntoValue> Sealed for Vec<(String, T)> {}
impl<T: IntoValue> IntoParams for Vec<(String, T)> {
    fn into_params(self) -> Result<Params> {
        let values = self
            .into_iter()
            .map(|(k, v)| Ok((k, v.into_value()?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Params::Named(values))
    }
}

impl<T: IntoValue, const N: usize> Sealed for [T; N] {}
impl<T: IntoValue, const N: usize> IntoParams for [T; N] {
    fn into_params(self) -> Result<Params> {
        self.into_iter().collect::<Vec<_>>().into_params()
    }
}

impl<T: IntoValue, const N: usize> Sealed for [(&str, T); N] {}
impl<T: IntoValue, const N: usize> IntoParams for [(&str, T); N] {
    fn into_params(self) -> Result<Params> {
        self.into_iter()
            .map(|(k, v)| Ok((k.to_string(), v.into_value()?)))
            .collect::<Result<Vec<_>>>()?
            .into_params()
    }
}

macro_rules! tuple_into_params {
    ($count:literal : $(($field:tt $ftype:ident)),* $(,)?) => {
        impl<$($ftype,)*> Sealed for ($($ftype,)*) where $($ftype: IntoValue,)* {}
        impl<$($ftype,)*> IntoParams for ($($ftype,)*) where $($ftype: IntoValue,)* {
            fn into_params(self) -> Result<Params> {
                Ok(Params::Positional(vec![$(self.$field.into_value()?),*]))
            }
        }
    };
}

tuple_into_params!(1: (0 A));
tuple_into_params!(2: (0 A), (1 B));
tuple_into_params!(3: (0 A), (1 B), (2 C));
tuple_into_params!(4: (0 A), (1 B), (2 C), (3 D));
tuple_into_params!(5: (0 A), (1 B), (2 C), (3 D), (4 E));
tuple_into_params!(6: (0 A), (1 B), (2 C), (3 D), (4 E), (5 F));
tuple_into_params!(7: (0 A), (1 B), (2 C), (3 D), (4 E), (5 F), (6 G));
tuple_into_params!(8: (0 A), (1 B), (2 C), (3 D), (4 E), (5 F), (6 G), (7 H));

/// Convert an owned iterator into positional params.
pub fn params_from_iter<I>(iter: I) -> impl IntoParams
where
    I: IntoIterator,
    I::Item: IntoValue,
{
    iter.into_iter().collect::<Vec<_>>()
}

/// Heterogeneous positional parameters.
///
/// ```rust,no_run
/// # use selenite::{params, Connection};
/// # fn run(conn: &Connection) -> selenite::Result<()> {
/// conn.execute("INSERT INTO users (id, name) VALUES (?1, ?2)", params![1i64, "Alice"])?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(vec![$($crate::Value::from($value)),+])
    };
}

/// Heterogeneous named parameters. Names keep their leading sigil.
///
/// ```rust,no_run
/// # use selenite::{named_params, Connection};
/// # fn run(conn: &Connection) -> selenite::Result<()> {
/// conn.execute(
///     "INSERT INTO users (id, name) VALUES (:id, :name)",
///     named_params! { ":id": 1i64, ":name": "Alice" },
/// )?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! named_params {
    () => {
        ()
    };
    ($($name:literal: $value:expr),+ $(,)?) => {
        $crate::Params::Named(vec![$(($name.to_string(), $crate::Value::from($value))),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_become_positional() {
        let params = (1i64, "two", 3.0f64).into_params().unwrap();
        match params {
            Params::Positional(values) => {
                assert_eq!(values.len(), 3);
                assert_eq!(values[0], Value::Integer(1));
                assert_eq!(values[1], Value::Text("two".into()));
                assert_eq!(values[2], Value::Real(3.0));
            }
            other => panic!("expected positional params, got {other:?}"),
        }
    }

    #[test]
    fn named_pairs_keep_sigils() {
        let params = [(":a", 1i64), ("@b", 2i64)].into_params().unwrap();
        match params {
            Params::Named(pairs) => {
                assert_eq!(pairs[0].0, ":a");
                assert_eq!(pairs[1].0, "@b");
            }
            other => panic!("expected named params, got {other:?}"),
        }
    }

    #[test]
    fn params_macro() {
        let params = params![1i64, "x"];
        match params {
            Params::Positional(values) => assert_eq!(values.len(), 2),
            other => panic!("expected positional params, got {other:?}"),
        }
    }
}
