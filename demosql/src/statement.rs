//!
//! Prepared statements and the restartable row iteration protocol.
//!
//! A `Statement` exclusively owns one compiled `sqlite3_stmt` handle and
//! borrows the `Connection` that compiled it. The handle is finalized
//! exactly once, through `finalize()` or on drop.
//!
//! Iteration is driven through `rows()`, which always resets the statement
//! to "before the first row" first, so every traversal is independent.
//! `Rows` holds the statement mutably, which rules out two traversals
//! interleaving over the same statement.
//!
//! Binding is always legal: every bind call resets the cursor position
//! before it touches the parameter set.
//!

use std::cell::OnceCell;
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use libc::c_int;
use rusqlite::ffi;
use tracing::{debug, trace};

use crate::bindable::Bindable;
use crate::connection::Connection;
use crate::error::{errstr, Error, Result};
use crate::row::Row;

pub struct Statement<'conn> {
    conn: &'conn Connection,
    handle: NonNull<ffi::sqlite3_stmt>,
    parameter_count: usize,
    column_count: usize,
    column_names: OnceCell<Vec<String>>,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(conn: &'conn Connection, handle: NonNull<ffi::sqlite3_stmt>) -> Self {
        let parameter_count = unsafe { ffi::sqlite3_bind_parameter_count(handle.as_ptr()) };
        let column_count = unsafe { ffi::sqlite3_column_count(handle.as_ptr()) };
        let statement = Statement {
            conn,
            handle,
            parameter_count: usize::try_from(parameter_count).unwrap_or(0),
            column_count: usize::try_from(column_count).unwrap_or(0),
            column_names: OnceCell::new(),
        };
        debug!(
            sql = statement.sql(),
            parameters = statement.parameter_count,
            columns = statement.column_count,
            "prepared statement"
        );
        statement
    }

    /// The SQL text that was compiled.
    pub fn sql(&self) -> &str {
        let text = unsafe { ffi::sqlite3_sql(self.raw()) };
        if text.is_null() {
            return "";
        }
        unsafe { CStr::from_ptr(text) }.to_str().unwrap_or("")
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Column names in declaration order, computed on first use.
    pub fn column_names(&self) -> &[String] {
        self.column_names.get_or_init(|| {
            (0..self.column_count)
                .map(|idx| {
                    let name = unsafe { ffi::sqlite3_column_name(self.raw(), native_index(idx)) };
                    if name.is_null() {
                        // only happens when the engine is out of memory
                        String::new()
                    } else {
                        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
                    }
                })
                .collect()
        })
    }

    pub fn column_name(&self, idx: usize) -> &str {
        self.check_column(idx);
        &self.column_names()[idx]
    }

    /// Clears every binding, then binds `values` at positions `0..values.len()`.
    ///
    /// # Panics
    /// When more values are supplied than the statement has parameters.
    pub fn bind(&mut self, values: &[&dyn Bindable]) -> Result<()> {
        assert!(
            values.len() <= self.parameter_count,
            "cannot bind {} values to a statement with {} parameters",
            values.len(),
            self.parameter_count
        );
        self.clear_bindings();
        for (idx, value) in values.iter().enumerate() {
            value.bind_to(self, idx)?;
        }
        Ok(())
    }

    /// Binds a single value at the 0-based position `idx`.
    pub fn bind_one<B: Bindable + ?Sized>(&mut self, value: &B, idx: usize) -> Result<()> {
        self.check_parameter(idx);
        value.bind_to(self, idx)
    }

    pub fn bind_null(&mut self, idx: usize) -> Result<()> {
        let position = self.bind_position(idx);
        let code = unsafe { ffi::sqlite3_bind_null(self.raw(), position) };
        self.check_bind(idx, code)
    }

    pub fn bind_integer(&mut self, idx: usize, value: i64) -> Result<()> {
        let position = self.bind_position(idx);
        let code = unsafe { ffi::sqlite3_bind_int64(self.raw(), position, value) };
        self.check_bind(idx, code)
    }

    pub fn bind_real(&mut self, idx: usize, value: f64) -> Result<()> {
        let position = self.bind_position(idx);
        let code = unsafe { ffi::sqlite3_bind_double(self.raw(), position, value) };
        self.check_bind(idx, code)
    }

    pub fn bind_text(&mut self, idx: usize, value: &str) -> Result<()> {
        let position = self.bind_position(idx);
        let len = self.byte_length(idx, value.len())?;
        let code = unsafe {
            ffi::sqlite3_bind_text(
                self.raw(),
                position,
                value.as_ptr().cast(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check_bind(idx, code)
    }

    pub fn bind_blob(&mut self, idx: usize, value: &[u8]) -> Result<()> {
        let position = self.bind_position(idx);
        let len = self.byte_length(idx, value.len())?;
        let code = if value.is_empty() {
            // a null data pointer would bind NULL instead of an empty blob
            unsafe { ffi::sqlite3_bind_zeroblob(self.raw(), position, 0) }
        } else {
            unsafe {
                ffi::sqlite3_bind_blob(
                    self.raw(),
                    position,
                    value.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            }
        };
        self.check_bind(idx, code)
    }

    /// Resets the cursor position and sets every parameter back to NULL.
    pub fn clear_bindings(&mut self) {
        self.reset();
        unsafe { ffi::sqlite3_clear_bindings(self.raw()) };
    }

    /// Starts a new traversal from before the first row.
    pub fn rows(&mut self) -> Rows<'_, 'conn> {
        self.reset();
        Rows {
            statement: self,
            done: false,
        }
    }

    /// Drives the statement to completion, discarding produced rows.
    pub fn run(&mut self) -> Result<()> {
        let mut rows = self.rows();
        while rows.next()?.is_some() {}
        Ok(())
    }

    /// Maps every row of a fresh traversal and collects the results.
    pub fn query_map<T, F>(&mut self, f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        self.rows().mapped(f).collect()
    }

    /// Maps the first row of a fresh traversal, if there is one.
    pub fn query_row<T, F>(&mut self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> Result<T>,
    {
        let mut rows = self.rows();
        match rows.next()? {
            Some(row) => f(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Releases the compiled handle and reports the engine's status.
    pub fn finalize(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);
        drop(this.column_names.take());
        let code = unsafe { ffi::sqlite3_finalize(this.raw()) };
        if code != ffi::SQLITE_OK {
            return Err(Error::Release {
                code,
                message: this.conn.last_error_message(),
            });
        }
        trace!("finalized statement");
        Ok(())
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3_stmt {
        self.handle.as_ptr()
    }

    pub(crate) fn check_column(&self, idx: usize) {
        assert!(
            idx < self.column_count,
            "column index {idx} out of range for a statement with {} columns",
            self.column_count
        );
    }

    fn check_parameter(&self, idx: usize) {
        assert!(
            idx < self.parameter_count,
            "parameter index {idx} out of range for a statement with {} parameters",
            self.parameter_count
        );
    }

    /// Validates `idx`, resets the cursor, and maps to the engine's 1-based position.
    fn bind_position(&mut self, idx: usize) -> c_int {
        self.check_parameter(idx);
        self.reset();
        native_index(idx + 1)
    }

    fn byte_length(&self, idx: usize, len: usize) -> Result<c_int> {
        c_int::try_from(len).map_err(|_| Error::Bind {
            index: idx,
            code: ffi::SQLITE_TOOBIG,
            message: errstr(ffi::SQLITE_TOOBIG),
        })
    }

    fn check_bind(&self, idx: usize, code: c_int) -> Result<()> {
        if code == ffi::SQLITE_OK {
            trace!(index = idx, "bound parameter");
            return Ok(());
        }
        Err(Error::Bind {
            index: idx,
            code,
            message: self.conn.last_error_message(),
        })
    }

    fn step(&mut self) -> Result<bool> {
        let code = unsafe { ffi::sqlite3_step(self.raw()) };
        match code {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            code => Err(Error::Step {
                code,
                message: self.conn.last_error_message(),
            }),
        }
    }

    // The status returned by sqlite3_reset repeats the last step failure,
    // which was already reported to the caller.
    fn reset(&mut self) {
        unsafe { ffi::sqlite3_reset(self.raw()) };
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        let code = unsafe { ffi::sqlite3_finalize(self.raw()) };
        trace!(code, "finalized statement");
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("parameter_count", &self.parameter_count)
            .field("column_count", &self.column_count)
            .finish_non_exhaustive()
    }
}

/// One traversal over a statement's result rows.
///
/// `next()` hands out a `Row` that borrows the traversal, so a row can never
/// be read after the cursor has moved on. Dropping the traversal resets the
/// statement, releasing any read locks it held.
pub struct Rows<'stmt, 'conn> {
    statement: &'stmt mut Statement<'conn>,
    done: bool,
}

impl<'stmt, 'conn> Rows<'stmt, 'conn> {
    /// Steps the engine once. `Ok(None)` is terminal for this traversal.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Row<'_>>> {
        if self.done {
            return Ok(None);
        }
        match self.statement.step() {
            Ok(true) => Ok(Some(Row::new(self.statement))),
            Ok(false) => {
                self.done = true;
                Ok(None)
            }
            Err(err) => {
                self.done = true;
                self.statement.reset();
                Err(err)
            }
        }
    }

    /// Adapts the traversal into a standard iterator of mapped rows.
    pub fn mapped<T, F>(self, map: F) -> MappedRows<'stmt, 'conn, F>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        MappedRows { rows: self, map }
    }
}

impl Drop for Rows<'_, '_> {
    fn drop(&mut self) {
        self.statement.reset();
    }
}

pub struct MappedRows<'stmt, 'conn, F> {
    rows: Rows<'stmt, 'conn>,
    map: F,
}

impl<T, F> Iterator for MappedRows<'_, '_, F>
where
    F: FnMut(&Row<'_>) -> Result<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        let map = &mut self.map;
        match self.rows.next() {
            Ok(Some(row)) => Some(map(&row)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn native_index(idx: usize) -> c_int {
    c_int::try_from(idx).unwrap_or(c_int::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_counts_and_names() {
        let conn = Connection::open_in_memory().unwrap();
        let stmt = conn.prepare("SELECT ? AS first, ? AS second, 3 AS third").unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        assert_eq!(stmt.column_count(), 3);
        assert_eq!(stmt.column_names(), ["first", "second", "third"]);
        assert_eq!(stmt.column_name(2), "third");
        assert_eq!(stmt.sql(), "SELECT ? AS first, ? AS second, 3 AS third");
    }

    #[test]
    fn test_prepare_ignores_trailing_statements() {
        let conn = Connection::open_in_memory().unwrap();
        let stmt = conn.prepare("SELECT 1; SELECT 2, 3;").unwrap();
        assert_eq!(stmt.column_count(), 1);
        assert!(stmt.sql().starts_with("SELECT 1"));
        assert!(!stmt.sql().contains("SELECT 2"));
    }

    #[test]
    fn test_rows_are_restartable() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT value FROM (SELECT 1 AS value UNION ALL SELECT 2 UNION ALL SELECT 3)")
            .unwrap();

        let first: Vec<i64> = stmt.query_map(|row| row.get(0)).unwrap();
        let second: Vec<i64> = stmt.query_map(|row| row.get(0)).unwrap();
        assert_eq!(first, [1, 2, 3]);
        assert_eq!(first, second);

        // abandoning a traversal part way does not leak into the next one
        {
            let mut rows = stmt.rows();
            assert_eq!(rows.next().unwrap().unwrap().get::<i64>(0).unwrap(), 1);
        }
        assert_eq!(stmt.query_row(|row| row.get::<i64>(0)).unwrap(), Some(1));
    }

    #[test]
    fn test_rows_terminal_after_done() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        let mut rows = stmt.rows();
        assert!(rows.next().unwrap().is_some());
        assert!(rows.next().unwrap().is_none());
        assert!(rows.next().unwrap().is_none());
    }

    #[test]
    fn test_bind_resets_cursor() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();
        stmt.bind(params![1]).unwrap();
        {
            let mut rows = stmt.rows();
            assert!(rows.next().unwrap().is_some());
        }
        stmt.bind_one(&2, 0).unwrap();
        assert_eq!(stmt.query_row(|row| row.get::<i64>(0)).unwrap(), Some(2));
    }

    #[test]
    fn test_clear_bindings_restores_nulls() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?, ?").unwrap();
        stmt.bind(params![7, "seven"]).unwrap();
        stmt.clear_bindings();
        let row = stmt
            .query_row(|row| Ok((row.is_null(0), row.is_null(1))))
            .unwrap();
        assert_eq!(row, Some((true, true)));
    }

    #[test]
    fn test_typed_bind_primitives() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?, ?, ?, ?, ?").unwrap();
        stmt.bind_null(0).unwrap();
        stmt.bind_integer(1, -42).unwrap();
        stmt.bind_real(2, 2.5).unwrap();
        stmt.bind_text(3, "text").unwrap();
        stmt.bind_blob(4, &[]).unwrap();
        let values = stmt
            .query_row(|row| {
                Ok((
                    row.get::<Option<i64>>(0)?,
                    row.get::<i64>(1)?,
                    row.get::<f64>(2)?,
                    row.get::<String>(3)?,
                    row.get::<Option<Vec<u8>>>(4)?,
                ))
            })
            .unwrap()
            .unwrap();
        assert_eq!(values, (None, -42, 2.5, "text".to_string(), Some(Vec::new())));
    }

    #[test]
    #[should_panic(expected = "cannot bind 3 values")]
    fn test_bind_too_many_values_panics() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?, ?").unwrap();
        let _ = stmt.bind(params![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "parameter index 1 out of range")]
    fn test_bind_position_out_of_range_panics() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ?").unwrap();
        let _ = stmt.bind_integer(1, 5);
    }

    #[test]
    #[should_panic(expected = "column index 1 out of range")]
    fn test_column_name_out_of_range_panics() {
        let conn = Connection::open_in_memory().unwrap();
        let stmt = conn.prepare("SELECT 1").unwrap();
        let _ = stmt.column_name(1);
    }

    #[test]
    fn test_step_failure_is_recoverable() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE u (id INTEGER PRIMARY KEY)").unwrap();
        let mut insert = conn.prepare("INSERT INTO u VALUES (?)").unwrap();

        insert.bind(params![1]).unwrap();
        insert.run().unwrap();
        let err = insert.run().unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_CONSTRAINT);
        assert!(err.message().contains("UNIQUE constraint failed"));

        insert.bind(params![2]).unwrap();
        insert.run().unwrap();
        let mut count = conn.prepare("SELECT COUNT(*) FROM u").unwrap();
        assert_eq!(count.query_row(|row| row.get::<i64>(0)).unwrap(), Some(2));
    }

    #[test]
    fn test_finalize_reports_ok() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 1").unwrap();
        stmt.run().unwrap();
        stmt.finalize().unwrap();
    }
}
