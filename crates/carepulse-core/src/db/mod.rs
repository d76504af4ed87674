//! Local SQLite backend.
//!
//! Implements every collaborator contract from [`crate::backend`] so the
//! system can run without the hosted service.

mod schema;
mod documents;
mod files;
mod users;
mod outbox;

pub use schema::*;
#[allow(unused_imports)]
pub use outbox::*;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use thiserror::Error;

use crate::backend::BackendError;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for BackendError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => BackendError::NotFound(what),
            DbError::Constraint(what) => BackendError::Conflict(what),
            DbError::Json(e) => BackendError::Malformed(e.to_string()),
            DbError::Sqlite(e) => BackendError::Transport(e.to_string()),
        }
    }
}

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Store timestamp, millisecond precision so listing order is stable.
pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Turn unique-constraint failures into `DbError::Constraint`.
pub(crate) fn constraint_or(e: rusqlite::Error, what: impl FnOnce() -> String) -> DbError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == ErrorCode::ConstraintViolation =>
        {
            DbError::Constraint(what())
        }
        other => DbError::Sqlite(other),
    }
}
