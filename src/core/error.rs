//! Error types for the database session layer
//!
//! This module defines all error types that can occur while opening sessions,
//! preparing and executing statements, iterating cursors and converting values.

use super::value::ValueKind;
use rusqlite::ffi;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The session has no open connection
    #[error("Database is not open: {path}")]
    NotOpen { path: String },

    /// The engine refused to open the database file
    #[error("Failed to open database {path}: {message}")]
    OpenFailed {
        path: String,
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Another statement is still being prepared or executed on this session
    #[error("Session is currently in use by another statement")]
    StatementInFlight,

    /// Supplied parameter count differs from the statement's placeholder count
    #[error("Parameter count mismatch: statement expects {expected}, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// A value accessor was asked for a kind the value cannot convert to
    #[error("Invalid conversion from {from} to {to}")]
    InvalidConversion { from: ValueKind, to: ValueKind },

    /// The value kind has no engine-native representation
    #[error("Cannot bind a {0} value to a statement parameter")]
    UnsupportedBinding(ValueKind),

    /// An update statement produced a result row
    #[error("Update statement returned a row: {0}")]
    UnexpectedRow(String),

    /// The cursor was already closed
    #[error("Result cursor is closed")]
    CursorClosed,

    /// The running statement was interrupted
    #[error("Statement was interrupted: {0}")]
    Interrupted(String),

    /// Timestamp text did not match the expected format
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Queued operation timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// SQL text or a path contained an interior NUL byte
    #[error("Invalid C string: {0}")]
    InvalidCString(#[from] std::ffi::NulError),

    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a not-open error for the given database path
    pub fn not_open(path: impl Into<String>) -> Self {
        DatabaseError::NotOpen { path: path.into() }
    }

    /// Create an engine error from a primary or extended result code and message
    pub fn engine(extended_code: i32, message: impl Into<String>) -> Self {
        DatabaseError::SqliteError(rusqlite::Error::SqliteFailure(
            ffi::Error::new(extended_code),
            Some(message.into()),
        ))
    }

    /// Create a new invalid conversion error
    pub fn invalid_conversion(from: ValueKind, to: ValueKind) -> Self {
        DatabaseError::InvalidConversion { from, to }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a queued operation timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        DatabaseError::UnsupportedOperation(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Primary SQLite result code, if this error came from the engine
    pub fn sqlite_code(&self) -> Option<ffi::ErrorCode> {
        match self {
            DatabaseError::SqliteError(rusqlite::Error::SqliteFailure(e, _)) => Some(e.code),
            _ => None,
        }
    }

    /// Extended SQLite result code, if this error came from the engine
    pub fn extended_code(&self) -> Option<i32> {
        match self {
            DatabaseError::SqliteError(rusqlite::Error::SqliteFailure(e, _)) => {
                Some(e.extended_code)
            }
            _ => None,
        }
    }

    /// Whether the engine gave up on a busy or locked database
    pub fn is_busy(&self) -> bool {
        matches!(
            self.sqlite_code(),
            Some(ffi::ErrorCode::DatabaseBusy) | Some(ffi::ErrorCode::DatabaseLocked)
        )
    }

    /// Whether this error is a programmer error rather than a runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::NotOpen { .. }
                | DatabaseError::StatementInFlight
                | DatabaseError::ParameterCountMismatch { .. }
                | DatabaseError::InvalidConversion { .. }
                | DatabaseError::UnsupportedBinding(_)
                | DatabaseError::UnexpectedRow(_)
                | DatabaseError::CursorClosed
                | DatabaseError::InvalidCString(_)
        )
    }
}
