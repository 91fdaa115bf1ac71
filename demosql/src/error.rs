//!
//! Error model for the SQLite access layer.
//!
//! Every recoverable failure carries the native status code and a message.
//! Messages are resolved in this order: the explicit text the engine handed
//! back for the failing call, the connection's last error text, and finally
//! the engine's generic description of the status code.
//!
//! Caller bugs (binding more values than there are parameters, out-of-range
//! parameter positions or column ordinals) are not represented here; those
//! panic at the call site.
//!

use std::ffi::CStr;

use libc::c_char;
use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Failed to open database at {location}: {message} (code {code})")]
    Open {
        location: String,
        code: i32,
        message: String,
    },

    #[error("Empty query or comment")]
    EmptyStatement,

    #[error("Failed to prepare statement: {message} (code {code})")]
    Prepare { code: i32, message: String },

    #[error("Execution failed: {message} (code {code})")]
    Execute { code: i32, message: String },

    #[error("Failed to advance statement: {message} (code {code})")]
    Step { code: i32, message: String },

    #[error("Failed to bind parameter {index}: {message} (code {code})")]
    Bind {
        index: usize,
        code: i32,
        message: String,
    },

    #[error("Failed to release native handle: {message} (code {code})")]
    Release { code: i32, message: String },

    #[error("Cannot convert column {index}: {message}")]
    Conversion { index: usize, message: String },

    #[error("Column {index} is NULL")]
    UnexpectedNull { index: usize },

    #[error("Invalid text for the engine: {0}")]
    InvalidText(String),
}

impl Error {
    /// Native status code; synthesized errors use the closest engine code.
    pub fn code(&self) -> i32 {
        match self {
            Error::Open { code, .. }
            | Error::Prepare { code, .. }
            | Error::Execute { code, .. }
            | Error::Step { code, .. }
            | Error::Bind { code, .. }
            | Error::Release { code, .. } => *code,
            Error::EmptyStatement | Error::InvalidText(_) => ffi::SQLITE_MISUSE,
            Error::Conversion { .. } | Error::UnexpectedNull { .. } => ffi::SQLITE_MISMATCH,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Open { message, .. }
            | Error::Prepare { message, .. }
            | Error::Execute { message, .. }
            | Error::Step { message, .. }
            | Error::Bind { message, .. }
            | Error::Release { message, .. }
            | Error::Conversion { message, .. } => message,
            Error::InvalidText(message) => message,
            Error::EmptyStatement => "Empty query or comment",
            Error::UnexpectedNull { .. } => "unexpected NULL value",
        }
    }
}

/// Generic engine text for a status code.
pub(crate) fn errstr(code: i32) -> String {
    let text = unsafe { ffi::sqlite3_errstr(code) };
    if text.is_null() {
        return format!("unknown error (code {code})");
    }
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

/// Most recent error text recorded on a database handle.
///
/// # Safety
/// `db` must be null or a handle returned by `sqlite3_open_v2` that has not
/// been closed yet.
pub(crate) unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    let text = unsafe { ffi::sqlite3_errmsg(db) };
    if text.is_null() {
        return errstr(ffi::SQLITE_NOMEM);
    }
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

/// Copies an engine-allocated message and releases it with `sqlite3_free`.
///
/// # Safety
/// `message` must be null or a string allocated by the engine that nobody
/// else frees.
pub(crate) unsafe fn take_message(message: *mut c_char) -> Option<String> {
    if message.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned();
    unsafe { ffi::sqlite3_free(message.cast()) };
    Some(text)
}
