//!
//! Parameter binding.
//!
//! `Bindable` is implemented by every type that knows how to attach itself
//! to a prepared statement. Implementations reduce to one of the statement's
//! typed primitives (`bind_null`, `bind_integer`, `bind_real`, `bind_text`,
//! `bind_blob`). Dates bind as real seconds since the Unix epoch.
//!
//! Positions are 0-based; the statement maps them onto the engine's 1-based
//! convention.
//!

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rusqlite::ffi;

use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::value::{epoch_seconds, utc_epoch_seconds, Value};

pub trait Bindable {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()>;
}

/// Builds a `&[&dyn Bindable]` slice for `Statement::bind`.
///
/// ```rust,ignore
/// insert.bind(params!["Andrew", "Morrow", "Speaker", 193])?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[] as &[&dyn $crate::Bindable]
    };
    ($($value:expr),+ $(,)?) => {
        &[$(&$value as &dyn $crate::Bindable),+] as &[&dyn $crate::Bindable]
    };
}

impl<T: Bindable + ?Sized> Bindable for &T {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        (**self).bind_to(statement, idx)
    }
}

impl<T: Bindable> Bindable for Option<T> {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        match self {
            Some(value) => value.bind_to(statement, idx),
            None => statement.bind_null(idx),
        }
    }
}

impl Bindable for Value {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        match self {
            Value::Null => statement.bind_null(idx),
            Value::Integer(value) => statement.bind_integer(idx, *value),
            Value::Real(value) => statement.bind_real(idx, *value),
            Value::Text(value) => statement.bind_text(idx, value),
            Value::Blob(value) => statement.bind_blob(idx, value),
            Value::Date(value) => statement.bind_real(idx, epoch_seconds(*value)),
        }
    }
}

impl Bindable for str {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_text(idx, self)
    }
}

impl Bindable for String {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_text(idx, self)
    }
}

impl Bindable for [u8] {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_blob(idx, self)
    }
}

impl<const N: usize> Bindable for [u8; N] {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_blob(idx, self)
    }
}

impl Bindable for Vec<u8> {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_blob(idx, self)
    }
}

impl Bindable for f64 {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_real(idx, *self)
    }
}

impl Bindable for f32 {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_real(idx, f64::from(*self))
    }
}

impl Bindable for bool {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_integer(idx, i64::from(*self))
    }
}

impl Bindable for SystemTime {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_real(idx, epoch_seconds(*self))
    }
}

impl Bindable for DateTime<Utc> {
    fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
        statement.bind_real(idx, utc_epoch_seconds(self))
    }
}

macro_rules! bindable_integer {
    ($($ty:ty),*) => {
        $(
            impl Bindable for $ty {
                fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
                    statement.bind_integer(idx, i64::from(*self))
                }
            }
        )*
    };
}

bindable_integer!(i8, i16, i32, i64, u8, u16, u32);

// Widths that do not always fit the engine's 64-bit signed integer.
macro_rules! bindable_wide_integer {
    ($($ty:ty),*) => {
        $(
            impl Bindable for $ty {
                fn bind_to(&self, statement: &mut Statement<'_>, idx: usize) -> Result<()> {
                    let value = i64::try_from(*self).map_err(|_| Error::Bind {
                        index: idx,
                        code: ffi::SQLITE_MISMATCH,
                        message: format!(
                            "{} value {} does not fit in a 64-bit signed integer",
                            stringify!($ty),
                            self
                        ),
                    })?;
                    statement.bind_integer(idx, value)
                }
            }
        )*
    };
}

bindable_wide_integer!(isize, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::params;
    use crate::value::StorageClass;

    fn bound_class(value: &dyn Bindable) -> StorageClass {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();
        stmt.bind(&[value]).unwrap();
        stmt.query_row(|row| Ok(row.storage_class(0)))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_storage_class_per_type() {
        assert_eq!(bound_class(&"text"), StorageClass::Text);
        assert_eq!(bound_class(&String::from("text")), StorageClass::Text);
        assert_eq!(bound_class(&vec![1_u8, 2]), StorageClass::Blob);
        assert_eq!(bound_class(b"raw"), StorageClass::Blob);
        assert_eq!(bound_class(&1.5_f64), StorageClass::Real);
        assert_eq!(bound_class(&1.5_f32), StorageClass::Real);
        assert_eq!(bound_class(&-3_i8), StorageClass::Integer);
        assert_eq!(bound_class(&u32::MAX), StorageClass::Integer);
        assert_eq!(bound_class(&7_usize), StorageClass::Integer);
        assert_eq!(bound_class(&true), StorageClass::Integer);
        assert_eq!(bound_class(&SystemTime::now()), StorageClass::Real);
        assert_eq!(bound_class(&Utc::now()), StorageClass::Real);
        assert_eq!(bound_class(&None::<i64>), StorageClass::Null);
        assert_eq!(bound_class(&Some(4_i64)), StorageClass::Integer);
        assert_eq!(bound_class(&Value::Null), StorageClass::Null);
        assert_eq!(bound_class(&Value::Date(SystemTime::UNIX_EPOCH)), StorageClass::Real);
    }

    #[test]
    fn test_wide_integer_overflow_is_reported() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();
        let err = stmt.bind(params![u64::MAX]).unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_MISMATCH);
        assert!(matches!(err, Error::Bind { index: 0, .. }));
        assert!(err.message().contains("does not fit"));

        stmt.bind(params![i64::MAX as u64]).unwrap();
        assert_eq!(stmt.query_row(|row| row.get::<u64>(0)).unwrap(), Some(i64::MAX as u64));
    }

    #[test]
    fn test_params_macro() {
        let empty = params![];
        assert!(empty.is_empty());
        let name = String::from("Andrew");
        let values = params![name, 193, None::<f64>,];
        assert_eq!(values.len(), 3);
    }
}
