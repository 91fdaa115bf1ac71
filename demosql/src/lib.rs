//!
//! demosql - Safe access to an embedded SQLite engine
//!
//! Wraps the engine's raw C interface (compiled in through rusqlite's
//! bundled build) in resource-owning types:
//!
//! - `Connection` owns the database handle: open, prepare, batch execute.
//! - `Statement` owns a compiled statement: bind, clear, run, iterate.
//! - `Rows` / `Row` iterate a statement and extract typed columns.
//! - `Bindable` / `Value` encode parameters into native storage classes.
//!
//! Failures reported by the engine come back as `Error` values carrying the
//! native status code. Misuse that only a caller bug can produce (too many
//! bind values, out-of-range positions or ordinals) panics.
//!
//! None of these types are `Send` or `Sync`. A connection and everything
//! derived from it stays on the thread that opened it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use demosql::{params, Connection};
//!
//! let db = Connection::open_in_memory()?;
//! db.execute("CREATE TABLE people (name TEXT, height INTEGER)")?;
//!
//! let mut insert = db.prepare("INSERT INTO people VALUES (?, ?)")?;
//! insert.bind(params!["Andrew", 193])?;
//! insert.run()?;
//!
//! let mut count = db.prepare("SELECT COUNT(*) FROM people")?;
//! let total: Option<i64> = count.query_row(|row| row.get(0))?;
//! ```
//!

pub mod bindable;
pub mod connection;
pub mod error;
pub mod exec;
pub mod row;
pub mod statement;
pub mod value;

use std::ffi::CStr;

use rusqlite::ffi;

pub use bindable::Bindable;
pub use connection::{Connection, OpenFlags, MEMORY_LOCATION};
pub use error::{Error, Result};
pub use exec::RowMap;
pub use row::{FromColumn, Row};
pub use statement::{MappedRows, Rows, Statement};
pub use value::{StorageClass, Value};

/// Version text of the linked engine, e.g. `3.45.0`.
pub fn version() -> &'static str {
    let text = unsafe { ffi::sqlite3_libversion() };
    if text.is_null() {
        return "";
    }
    unsafe { CStr::from_ptr(text) }.to_str().unwrap_or("")
}
