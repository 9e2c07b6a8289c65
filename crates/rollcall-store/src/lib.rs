//! rollcall-store — SQLite persistence for faculty records, face samples,
//! and attendance.
//!
//! The store enforces no attendance policy itself; the decision engine
//! does. What it does guarantee is the `UNIQUE(faculty_id, date)`
//! constraint and insert-if-absent semantics the decision engine relies on.

pub mod attendance;
pub mod faculty;
pub mod samples;
mod schema;

pub use attendance::{AttendanceRecord, DailyReport, InsertOutcome, MonthlyReport, MonthlyRow, Status};
pub use faculty::{Faculty, NewFaculty};

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid stored value: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the attendance database.
///
/// `Connection` is not `Sync`; the daemon keeps its store on the engine
/// thread, which also serves as the serialization point for attendance
/// decisions.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::create_all(&conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}
