//!
//! Batch execution and the row callback bridge.
//!
//! `sqlite3_exec` reports rows through a C function pointer plus an opaque
//! context pointer. The caller's handler is wrapped in an `ExecContext` that
//! lives on this module's stack frame for the whole native call; the engine
//! only ever sees a borrowed pointer to it and never owns it.
//!
//! The trampoline decodes the parallel name/value arrays into a `RowMap`,
//! invokes the handler, and translates its answer into the engine's step
//! control code (0 continues, non-zero aborts the batch). Panics raised by
//! the handler are caught before they reach the C frames and resumed once
//! the native call has returned.
//!

use std::any::Any;
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use indexmap::IndexMap;
use libc::{c_char, c_int, c_void};
use rusqlite::ffi;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{take_message, Error, Result};

/// Column name to column text for one row produced by a batch.
pub type RowMap = IndexMap<String, String>;

const CONTINUE: c_int = 0;
const ABORT: c_int = 1;

type RowCallback =
    unsafe extern "C" fn(*mut c_void, c_int, *mut *mut c_char, *mut *mut c_char) -> c_int;

struct ExecContext<'h> {
    handler: &'h mut dyn FnMut(RowMap) -> bool,
    rows: usize,
    aborted: bool,
    panic: Option<Box<dyn Any + Send>>,
}

pub(crate) fn run_batch(
    conn: &Connection,
    sql: &str,
    handler: Option<&mut dyn FnMut(RowMap) -> bool>,
) -> Result<()> {
    let c_sql = CString::new(sql)
        .map_err(|_| Error::InvalidText("SQL text contains a NUL byte".to_string()))?;

    let mut context = handler.map(|handler| ExecContext {
        handler,
        rows: 0,
        aborted: false,
        panic: None,
    });
    let (callback, context_ptr): (Option<RowCallback>, *mut c_void) = match context.as_mut() {
        Some(context) => (
            Some(row_trampoline as RowCallback),
            (context as *mut ExecContext<'_>).cast(),
        ),
        None => (None, ptr::null_mut()),
    };

    debug!(sql, with_handler = callback.is_some(), "executing batch");

    let mut errmsg: *mut c_char = ptr::null_mut();
    let code = unsafe {
        ffi::sqlite3_exec(conn.raw(), c_sql.as_ptr(), callback, context_ptr, &mut errmsg)
    };
    let message = unsafe { take_message(errmsg) };

    if let Some(context) = context {
        if let Some(payload) = context.panic {
            panic::resume_unwind(payload);
        }
        if context.aborted && code == ffi::SQLITE_ABORT {
            debug!(rows = context.rows, "batch stopped by row handler");
            return Ok(());
        }
        trace!(rows = context.rows, "batch visited rows");
    }

    if code != ffi::SQLITE_OK {
        let message = conn.error_message(message, code);
        debug!(code, %message, "batch failed");
        return Err(Error::Execute { code, message });
    }
    Ok(())
}

unsafe extern "C" fn row_trampoline(
    context: *mut c_void,
    column_count: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> c_int {
    if context.is_null() {
        return ABORT;
    }
    let context = unsafe { &mut *context.cast::<ExecContext<'_>>() };
    let row = unsafe { decode_row(column_count, values, names) };
    context.rows += 1;

    match panic::catch_unwind(AssertUnwindSafe(|| (context.handler)(row))) {
        Ok(true) => CONTINUE,
        Ok(false) => {
            context.aborted = true;
            ABORT
        }
        Err(payload) => {
            context.panic = Some(payload);
            ABORT
        }
    }
}

/// Builds the row mapping from the engine's parallel C string arrays.
/// A null value pointer is a SQL NULL and gets no entry.
///
/// # Safety
/// `names` and `values` must each be null or point at `column_count` valid
/// C string pointers.
unsafe fn decode_row(
    column_count: c_int,
    values: *mut *mut c_char,
    names: *mut *mut c_char,
) -> RowMap {
    let count = usize::try_from(column_count).unwrap_or(0);
    let mut row = RowMap::with_capacity(count);
    if names.is_null() || values.is_null() {
        return row;
    }

    let names = unsafe { std::slice::from_raw_parts(names, count) };
    let values = unsafe { std::slice::from_raw_parts(values, count) };
    for (&name, &value) in names.iter().zip(values) {
        if name.is_null() || value.is_null() {
            continue;
        }
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        let value = unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned();
        row.insert(name, value);
    }
    row
}
