//!
//! Row cursor and typed column extraction.
//!
//! A `Row` is a non-owning view over the statement's current native row.
//! Nothing is copied up front; every accessor reads live from the engine.
//! Rows are only handed out by `Rows::next()` and borrow the traversal, so a
//! row cannot be read after the cursor advances or resets.
//!
//! Column ordinals are 0-based. An ordinal outside `0..column_count` is a
//! caller bug and panics.
//!

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rusqlite::ffi;

use crate::error::{errstr, Error, Result};
use crate::statement::Statement;
use crate::value::{system_time_from_epoch, utc_from_epoch, StorageClass, Value};

#[derive(Clone, Copy)]
pub struct Row<'stmt> {
    statement: &'stmt Statement<'stmt>,
}

impl<'stmt> Row<'stmt> {
    pub(crate) fn new(statement: &'stmt Statement<'stmt>) -> Self {
        Row { statement }
    }

    pub fn column_count(&self) -> usize {
        self.statement.column_count()
    }

    pub fn column_names(&self) -> &'stmt [String] {
        self.statement.column_names()
    }

    /// Reads column `idx` as `T`.
    ///
    /// ```rust,ignore
    /// let count: i64 = row.get(0)?;
    /// let role: Option<String> = row.get(1)?;
    /// ```
    pub fn get<T: FromColumn>(&self, idx: usize) -> Result<T> {
        self.statement.check_column(idx);
        T::from_column(self, idx)
    }

    pub fn storage_class(&self, idx: usize) -> StorageClass {
        self.statement.check_column(idx);
        let code = unsafe { ffi::sqlite3_column_type(self.statement.raw(), ordinal(idx)) };
        StorageClass::from_raw(code)
    }

    pub fn is_null(&self, idx: usize) -> bool {
        self.storage_class(idx) == StorageClass::Null
    }

    /// Native integer value; NULL reads as 0.
    pub fn integer(&self, idx: usize) -> i64 {
        self.statement.check_column(idx);
        unsafe { ffi::sqlite3_column_int64(self.statement.raw(), ordinal(idx)) }
    }

    /// Native real value; NULL reads as 0.0.
    pub fn real(&self, idx: usize) -> f64 {
        self.statement.check_column(idx);
        unsafe { ffi::sqlite3_column_double(self.statement.raw(), ordinal(idx)) }
    }

    /// Borrowed UTF-8 text, `None` for NULL. Valid until the cursor moves.
    pub fn text(&self, idx: usize) -> Result<Option<&'stmt str>> {
        if self.is_null(idx) {
            return Ok(None);
        }
        let raw = self.statement.raw();
        let data = unsafe { ffi::sqlite3_column_text(raw, ordinal(idx)) };
        if data.is_null() {
            return Err(Error::Conversion {
                index: idx,
                message: errstr(ffi::SQLITE_NOMEM),
            });
        }
        let len = unsafe { ffi::sqlite3_column_bytes(raw, ordinal(idx)) };
        let bytes = unsafe { std::slice::from_raw_parts(data, usize::try_from(len).unwrap_or(0)) };
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|err| Error::Conversion {
                index: idx,
                message: format!("invalid UTF-8 text: {err}"),
            })
    }

    /// Borrowed blob bytes, `None` for NULL. Valid until the cursor moves.
    pub fn blob(&self, idx: usize) -> Option<&'stmt [u8]> {
        if self.is_null(idx) {
            return None;
        }
        let raw = self.statement.raw();
        let data = unsafe { ffi::sqlite3_column_blob(raw, ordinal(idx)) };
        let len = unsafe { ffi::sqlite3_column_bytes(raw, ordinal(idx)) };
        let len = usize::try_from(len).unwrap_or(0);
        if data.is_null() || len == 0 {
            return Some(&[]);
        }
        Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) })
    }
}

impl std::fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let classes: Vec<StorageClass> =
            (0..self.column_count()).map(|idx| self.storage_class(idx)).collect();
        f.debug_struct("Row")
            .field("columns", &self.column_names())
            .field("storage", &classes)
            .finish()
    }
}

fn ordinal(idx: usize) -> libc::c_int {
    libc::c_int::try_from(idx).unwrap_or(libc::c_int::MAX)
}

/// Types that can be extracted from a column of the current row.
///
/// The ordinal has already been range-checked when `from_column` runs.
pub trait FromColumn: Sized {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self>;
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        if row.is_null(idx) {
            return Ok(None);
        }
        T::from_column(row, idx).map(Some)
    }
}

impl FromColumn for i64 {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        Ok(row.integer(idx))
    }
}

macro_rules! from_integer_column {
    ($($ty:ty),*) => {
        $(
            impl FromColumn for $ty {
                fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
                    let value = row.integer(idx);
                    <$ty>::try_from(value).map_err(|_| Error::Conversion {
                        index: idx,
                        message: format!("{value} does not fit in {}", stringify!($ty)),
                    })
                }
            }
        )*
    };
}

from_integer_column!(i8, i16, i32, isize, u8, u16, u32, u64, usize);

impl FromColumn for bool {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        Ok(row.integer(idx) != 0)
    }
}

impl FromColumn for f64 {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        Ok(row.real(idx))
    }
}

impl FromColumn for f32 {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        Ok(row.real(idx) as f32)
    }
}

impl FromColumn for String {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        match row.text(idx)? {
            Some(text) => Ok(text.to_owned()),
            None => Err(Error::UnexpectedNull { index: idx }),
        }
    }
}

impl FromColumn for Vec<u8> {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        row.blob(idx)
            .map(<[u8]>::to_vec)
            .ok_or(Error::UnexpectedNull { index: idx })
    }
}

impl FromColumn for SystemTime {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        if row.is_null(idx) {
            return Err(Error::UnexpectedNull { index: idx });
        }
        let seconds = row.real(idx);
        system_time_from_epoch(seconds).ok_or_else(|| Error::Conversion {
            index: idx,
            message: format!("{seconds} is not a representable epoch time"),
        })
    }
}

impl FromColumn for DateTime<Utc> {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        if row.is_null(idx) {
            return Err(Error::UnexpectedNull { index: idx });
        }
        let seconds = row.real(idx);
        utc_from_epoch(seconds).ok_or_else(|| Error::Conversion {
            index: idx,
            message: format!("{seconds} is not a representable epoch time"),
        })
    }
}

impl FromColumn for Value {
    fn from_column(row: &Row<'_>, idx: usize) -> Result<Self> {
        Ok(match row.storage_class(idx) {
            StorageClass::Null => Value::Null,
            StorageClass::Integer => Value::Integer(row.integer(idx)),
            StorageClass::Real => Value::Real(row.real(idx)),
            StorageClass::Text => Value::Text(String::from_column(row, idx)?),
            StorageClass::Blob => Value::Blob(Vec::from_column(row, idx)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::connection::Connection;
    use crate::error::Error;
    use crate::params;
    use crate::value::{StorageClass, Value};

    #[test]
    fn test_storage_classes() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT NULL, 1, 1.5, 'a', x'00ff'").unwrap();
        let classes = stmt
            .query_row(|row| Ok((0..row.column_count()).map(|idx| row.storage_class(idx)).collect::<Vec<_>>()))
            .unwrap()
            .unwrap();
        assert_eq!(
            classes,
            [
                StorageClass::Null,
                StorageClass::Integer,
                StorageClass::Real,
                StorageClass::Text,
                StorageClass::Blob
            ]
        );
    }

    #[test]
    fn test_optional_reads_test_storage_class() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT NULL, 0, '', x''").unwrap();
        stmt.query_row(|row| {
            assert_eq!(row.get::<Option<String>>(0)?, None);
            assert_eq!(row.get::<Option<Vec<u8>>>(0)?, None);
            assert_eq!(row.get::<Option<i64>>(1)?, Some(0));
            assert_eq!(row.get::<Option<String>>(2)?, Some(String::new()));
            assert_eq!(row.get::<Option<Vec<u8>>>(3)?, Some(Vec::new()));
            assert_eq!(row.text(0)?, None);
            assert_eq!(row.blob(3), Some(&[][..]));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_non_optional_null_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT NULL").unwrap();
        let err = stmt.query_row(|row| row.get::<String>(0)).unwrap_err();
        assert_eq!(err, Error::UnexpectedNull { index: 0 });
        let err = stmt
            .query_row(|row| row.get::<std::time::SystemTime>(0))
            .unwrap_err();
        assert_eq!(err, Error::UnexpectedNull { index: 0 });
        // integers follow the engine's coercion
        assert_eq!(stmt.query_row(|row| row.get::<i64>(0)).unwrap(), Some(0));
    }

    #[test]
    fn test_integer_narrowing() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();

        stmt.bind(params![300]).unwrap();
        assert_eq!(stmt.query_row(|row| row.get::<u16>(0)).unwrap(), Some(300));
        assert_eq!(stmt.query_row(|row| row.get::<i32>(0)).unwrap(), Some(300));
        let err = stmt.query_row(|row| row.get::<u8>(0)).unwrap_err();
        assert!(matches!(err, Error::Conversion { index: 0, .. }));
        assert!(err.message().contains("300 does not fit in u8"));

        stmt.bind(params![-1]).unwrap();
        assert!(stmt.query_row(|row| row.get::<u64>(0)).is_err());
        assert_eq!(stmt.query_row(|row| row.get::<bool>(0)).unwrap(), Some(true));
    }

    #[test]
    fn test_real_narrowing() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 0.5, 7").unwrap();
        let (half, seven) = stmt
            .query_row(|row| Ok((row.get::<f32>(0)?, row.get::<f64>(1)?)))
            .unwrap()
            .unwrap();
        assert_eq!(half, 0.5_f32);
        assert_eq!(seven, 7.0);
    }

    #[test]
    fn test_value_extraction() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT NULL, 2, 2.5, 'two', x'02'").unwrap();
        let values = stmt
            .query_row(|row| (0..5).map(|idx| row.get::<Value>(idx)).collect::<Result<Vec<_>, _>>())
            .unwrap()
            .unwrap();
        assert_eq!(
            values,
            [
                Value::Null,
                Value::Integer(2),
                Value::Real(2.5),
                Value::Text("two".to_string()),
                Value::Blob(vec![2]),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_text() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT CAST(x'ff' AS TEXT)").unwrap();
        let err = stmt.query_row(|row| row.get::<String>(0)).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    #[should_panic(expected = "column index 2 out of range")]
    fn test_column_out_of_range_panics() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 1, 2").unwrap();
        let _ = stmt.query_row(|row| row.get::<i64>(2));
    }
}
