//!
//! Database connection.
//!
//! A `Connection` exclusively owns one native `sqlite3` handle. The handle is
//! released exactly once, either through `close()` or when the connection is
//! dropped. Statements borrow the connection, so the compiler rejects any
//! program that would let a statement outlive it.
//!
//! Connections hold a raw pointer and are therefore neither `Send` nor
//! `Sync`: a connection and everything derived from it stays on the thread
//! that opened it.
//!

use std::ffi::CString;
use std::mem::{self, ManuallyDrop};
use std::ops::BitOr;
use std::path::Path;
use std::ptr::{self, NonNull};

use libc::c_int;
use rusqlite::ffi;
use tracing::{debug, warn};

use crate::error::{errmsg, errstr, Error, Result};
use crate::exec::{self, RowMap};
use crate::statement::Statement;

/// Location marker for an ephemeral, process-local database.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Flags handed to the native open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(c_int);

impl OpenFlags {
    pub const READ_ONLY: OpenFlags = OpenFlags(ffi::SQLITE_OPEN_READONLY);
    pub const READ_WRITE: OpenFlags = OpenFlags(ffi::SQLITE_OPEN_READWRITE);
    pub const CREATE: OpenFlags = OpenFlags(ffi::SQLITE_OPEN_CREATE);
    pub const URI: OpenFlags = OpenFlags(ffi::SQLITE_OPEN_URI);
    pub const MEMORY: OpenFlags = OpenFlags(ffi::SQLITE_OPEN_MEMORY);

    pub fn bits(self) -> c_int {
        self.0
    }

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::URI
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

pub struct Connection {
    handle: NonNull<ffi::sqlite3>,
    location: String,
}

impl Connection {
    /// Opens or creates the database at `location` for reading and writing.
    /// URI file names (`file:...`) are interpreted.
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_flags(location, OpenFlags::default())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY_LOCATION)
    }

    pub fn open_with_flags(location: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let location = location
            .as_ref()
            .to_str()
            .ok_or_else(|| {
                Error::InvalidText(format!(
                    "location is not valid UTF-8: {}",
                    location.as_ref().display()
                ))
            })?
            .to_string();
        let c_location = CString::new(location.as_str())
            .map_err(|_| Error::InvalidText(format!("location contains a NUL byte: {location:?}")))?;

        let mut raw: *mut ffi::sqlite3 = ptr::null_mut();
        let code = unsafe {
            ffi::sqlite3_open_v2(c_location.as_ptr(), &mut raw, flags.bits(), ptr::null())
        };

        if code != ffi::SQLITE_OK {
            let message = if raw.is_null() {
                errstr(code)
            } else {
                unsafe { errmsg(raw) }
            };
            // The engine may hand back a handle even on failure; it must still be released.
            unsafe { ffi::sqlite3_close(raw) };
            debug!(%location, code, %message, "failed to open database");
            return Err(Error::Open {
                location,
                code,
                message,
            });
        }

        let handle = NonNull::new(raw).ok_or_else(|| Error::Open {
            location: location.clone(),
            code: ffi::SQLITE_NOMEM,
            message: errstr(ffi::SQLITE_NOMEM),
        })?;

        debug!(%location, flags = flags.bits(), "opened database");
        Ok(Connection { handle, location })
    }

    /// The location string this connection was opened with.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Compiles the first SQL statement in `sql`. Text after the first
    /// complete statement is ignored.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| Error::InvalidText(format!("SQL text is {} bytes long", sql.len())))?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let code = unsafe {
            ffi::sqlite3_prepare_v2(
                self.raw(),
                sql.as_ptr().cast(),
                len,
                &mut raw,
                ptr::null_mut(),
            )
        };

        if code != ffi::SQLITE_OK {
            let message = self.last_error_message();
            if !raw.is_null() {
                unsafe { ffi::sqlite3_finalize(raw) };
            }
            debug!(code, %message, "failed to prepare statement");
            return Err(Error::Prepare { code, message });
        }

        match NonNull::new(raw) {
            Some(handle) => Ok(Statement::new(self, handle)),
            None => Err(Error::EmptyStatement),
        }
    }

    /// Runs one or more semicolon-separated statements, discarding any rows.
    pub fn execute(&self, sql: &str) -> Result<()> {
        exec::run_batch(self, sql, None)
    }

    /// Runs one or more semicolon-separated statements, handing every
    /// produced row to `on_row` as a column name to text mapping. NULL
    /// columns are left out of the mapping.
    ///
    /// Returning `false` from `on_row` stops the whole batch; that is not
    /// reported as an error.
    pub fn execute_with_rows<F>(&self, sql: &str, mut on_row: F) -> Result<()>
    where
        F: FnMut(RowMap) -> bool,
    {
        exec::run_batch(self, sql, Some(&mut on_row))
    }

    /// Rows modified by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        let changes = unsafe { ffi::sqlite3_changes(self.raw()) };
        u64::try_from(changes).unwrap_or(0)
    }

    pub fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.raw()) }
    }

    /// Releases the native handle and reports the engine's status.
    pub fn close(self) -> Result<()> {
        let mut this = ManuallyDrop::new(self);
        let location = mem::take(&mut this.location);
        let code = unsafe { ffi::sqlite3_close_v2(this.raw()) };
        if code != ffi::SQLITE_OK {
            // a failed close leaves the handle open, so its error text is still readable
            return Err(Error::Release {
                code,
                message: this.error_message(None, code),
            });
        }
        debug!(%location, "closed database");
        Ok(())
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3 {
        self.handle.as_ptr()
    }

    pub(crate) fn last_error_message(&self) -> String {
        unsafe { errmsg(self.raw()) }
    }

    /// Resolves the text for a failed call: the message the engine handed
    /// back for it, else the connection's last error, else the generic text
    /// for `code`.
    pub(crate) fn error_message(&self, explicit: Option<String>, code: c_int) -> String {
        if let Some(message) = explicit {
            return message;
        }
        if unsafe { ffi::sqlite3_errcode(self.raw()) } != ffi::SQLITE_OK {
            return self.last_error_message();
        }
        errstr(code)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // close_v2 defers the release while statements are still unfinalized
        let code = unsafe { ffi::sqlite3_close_v2(self.raw()) };
        if code != ffi::SQLITE_OK {
            warn!(location = %self.location, code, "failed to close database");
        } else {
            debug!(location = %self.location, "closed database");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
