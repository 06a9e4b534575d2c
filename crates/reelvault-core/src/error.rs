//! Unified error types for the reelvault library.
//!
//! [`DatabaseError`] maps SQLite (extended) result codes into a typed
//! taxonomy so callers can tell transient concurrency failures apart from
//! domain-rule violations and fatal corruption. [`Error`] is the
//! crate-level wrapper every public API returns.

use std::fmt;

// Extended result codes, as defined by SQLite. rusqlite only exposes the
// primary code as an enum, so the sub-classification is done on the raw
// extended value.
const SQLITE_CONSTRAINT_CHECK: i32 = 275;
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_NOTNULL: i32 = 1299;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;
const SQLITE_CONSTRAINT_ROWID: i32 = 2579;

// ---------------------------------------------------------------------------
// ConstraintKind
// ---------------------------------------------------------------------------

/// Sub-classification of a SQLite constraint violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Check,
    ForeignKey,
    NotNull,
    PrimaryKey,
    RowId,
    Unique,
    /// Any other `SQLITE_CONSTRAINT_*` sub-code.
    Other,
}

impl ConstraintKind {
    fn from_extended_code(code: i32) -> Self {
        match code {
            SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
            SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
            SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
            SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
            SQLITE_CONSTRAINT_ROWID => ConstraintKind::RowId,
            SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
            _ => ConstraintKind::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseError
// ---------------------------------------------------------------------------

/// Typed view over every failure the storage backend can report.
///
/// The transient variants (`Busy`, `Locked`, `ReadOnly`, `Io`, `NoMem`,
/// `Full`) are classified as *innocuous*: the statement layer retries them
/// up to ten times before letting them surface.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// A domain rule encoded in the schema was violated.
    #[error("constraint violation ({kind:?}): {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    /// Another connection holds a conflicting lock.
    #[error("database busy: {0}")]
    Busy(String),

    /// A table is locked by a statement on the same connection.
    #[error("database locked: {0}")]
    Locked(String),

    /// The database file cannot be written.
    #[error("database is read-only: {0}")]
    ReadOnly(String),

    /// The storage layer reported an I/O failure.
    #[error("database I/O error: {0}")]
    Io(String),

    /// SQLite reported the database file as corrupted.
    #[error("database corrupted: {0}")]
    Corrupt(String),

    /// The database or the disk is full.
    #[error("database full: {0}")]
    Full(String),

    /// SQLite could not allocate memory.
    #[error("out of memory: {0}")]
    NoMem(String),

    /// `SQLITE_ERROR`: usually malformed SQL or a missing object.
    #[error("generic sqlite error: {0}")]
    Generic(String),

    /// File locking protocol failure.
    #[error("sqlite protocol error: {0}")]
    Protocol(String),

    /// The schema changed under a prepared statement.
    #[error("database schema changed: {0}")]
    SchemaChanged(String),

    /// A column held a value of an unexpected type.
    #[error("column type mismatch: {0}")]
    TypeMismatch(String),

    /// The SQLite API was used incorrectly (including nested transactions).
    #[error("sqlite misuse: {0}")]
    LibMisuse(String),

    /// A row was asked for a column past the last one.
    #[error("column index {index} out of range ({count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },
}

impl DatabaseError {
    /// True when a retry has a chance of succeeding.
    pub fn is_innocuous(&self) -> bool {
        matches!(
            self,
            DatabaseError::Busy(_)
                | DatabaseError::Locked(_)
                | DatabaseError::ReadOnly(_)
                | DatabaseError::Io(_)
                | DatabaseError::NoMem(_)
                | DatabaseError::Full(_)
        )
    }

    /// True when the error denotes unrecoverable on-disk state and the
    /// database should be deleted and recreated.
    pub fn requires_db_reset(&self) -> bool {
        matches!(self, DatabaseError::Corrupt(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Constraint {
                kind: ConstraintKind::Unique | ConstraintKind::PrimaryKey,
                ..
            }
        )
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::Constraint {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => {
                let message = msg
                    .clone()
                    .unwrap_or_else(|| code.to_string());
                match code.code {
                    ErrorCode::ConstraintViolation => DatabaseError::Constraint {
                        kind: ConstraintKind::from_extended_code(code.extended_code),
                        message,
                    },
                    ErrorCode::DatabaseBusy => DatabaseError::Busy(message),
                    ErrorCode::DatabaseLocked => DatabaseError::Locked(message),
                    ErrorCode::ReadOnly => DatabaseError::ReadOnly(message),
                    ErrorCode::SystemIoFailure => DatabaseError::Io(message),
                    ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                        DatabaseError::Corrupt(message)
                    }
                    ErrorCode::DiskFull => DatabaseError::Full(message),
                    ErrorCode::OutOfMemory => DatabaseError::NoMem(message),
                    ErrorCode::FileLockingProtocolFailed => DatabaseError::Protocol(message),
                    ErrorCode::SchemaChanged => DatabaseError::SchemaChanged(message),
                    ErrorCode::TypeMismatch => DatabaseError::TypeMismatch(message),
                    ErrorCode::ApiMisuse => DatabaseError::LibMisuse(message),
                    _ => DatabaseError::Generic(message),
                }
            }
            rusqlite::Error::InvalidColumnIndex(idx) => DatabaseError::ColumnOutOfRange {
                index: *idx,
                count: 0,
            },
            rusqlite::Error::InvalidColumnType(idx, name, ty) => DatabaseError::TypeMismatch(
                format!("column {idx} ({name}) holds a {ty}"),
            ),
            rusqlite::Error::FromSqlConversionFailure(idx, ty, e) => {
                DatabaseError::TypeMismatch(format!("column {idx} ({ty}): {e}"))
            }
            rusqlite::Error::IntegralValueOutOfRange(idx, v) => {
                DatabaseError::TypeMismatch(format!("column {idx}: value {v} out of range"))
            }
            other => DatabaseError::Generic(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Crate-level error wrapper returned by every fallible reelvault API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media", "playlist").
        entity: &'static str,
        /// The identifier that was looked up.
        id: i64,
    },

    /// A storage backend failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// An I/O failure outside the database (lock file, cache folders).
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Caller-supplied data failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An invariant the library relies on was broken.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Error::NotFound { entity, id }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::Internal`].
    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    /// True when the underlying failure requires the database file to be
    /// deleted and recreated.
    pub fn requires_db_reset(&self) -> bool {
        matches!(self, Error::Database(e) if e.requires_db_reset())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(DatabaseError::from(err))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: rusqlite::ErrorCode, extended: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            Some("boom".into()),
        )
    }

    #[test]
    fn unique_constraint_classified() {
        let err = DatabaseError::from(sqlite_failure(
            rusqlite::ErrorCode::ConstraintViolation,
            SQLITE_CONSTRAINT_UNIQUE,
        ));
        assert!(err.is_unique_violation());
        assert!(!err.is_innocuous());
        assert!(!err.requires_db_reset());
    }

    #[test]
    fn foreign_key_constraint_classified() {
        let err = DatabaseError::from(sqlite_failure(
            rusqlite::ErrorCode::ConstraintViolation,
            SQLITE_CONSTRAINT_FOREIGNKEY,
        ));
        assert!(err.is_foreign_key_violation());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn busy_is_innocuous() {
        let err = DatabaseError::from(sqlite_failure(rusqlite::ErrorCode::DatabaseBusy, 5));
        assert!(matches!(err, DatabaseError::Busy(_)));
        assert!(err.is_innocuous());
    }

    #[test]
    fn corrupt_requires_reset() {
        let err = DatabaseError::from(sqlite_failure(rusqlite::ErrorCode::DatabaseCorrupt, 11));
        assert!(err.requires_db_reset());
        let wrapped = Error::from(sqlite_failure(rusqlite::ErrorCode::DatabaseCorrupt, 11));
        assert!(wrapped.requires_db_reset());
    }

    #[test]
    fn column_out_of_range_display() {
        let err = DatabaseError::ColumnOutOfRange { index: 4, count: 3 };
        assert_eq!(err.to_string(), "column index 4 out of range (3 columns)");
    }

    #[test]
    fn not_found_display() {
        let err = Error::not_found("media", 42);
        assert_eq!(err.to_string(), "media not found: 42");
        assert!(!err.requires_db_reset());
    }

    #[test]
    fn invalid_column_index_maps_to_out_of_range() {
        let err = DatabaseError::from(rusqlite::Error::InvalidColumnIndex(7));
        assert!(matches!(
            err,
            DatabaseError::ColumnOutOfRange { index: 7, .. }
        ));
    }
}
