//! Prepared statements
//!
//! A [`PreparedStatement`] owns one compiled statement handle together with
//! the SQL text it came from, an in-use flag and a use counter. Preparing and
//! caching are the session's job; this type only tracks state and knows how
//! to reset or release its handle.

use super::engine::RawStatement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a prepared statement within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatementId(pub(crate) u64);

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt-{}", self.0)
    }
}

/// A compiled statement plus its bookkeeping
pub struct PreparedStatement {
    id: StatementId,
    statement: Option<RawStatement>,
    query: String,
    use_count: u64,
    in_use: bool,
}

impl PreparedStatement {
    pub(crate) fn new(id: StatementId, statement: RawStatement, query: impl Into<String>) -> Self {
        Self {
            id,
            statement: Some(statement),
            query: query.into(),
            use_count: 0,
            in_use: false,
        }
    }

    pub fn id(&self) -> StatementId {
        self.id
    }

    /// The compiled handle; `None` once closed
    pub(crate) fn statement(&self) -> Option<&RawStatement> {
        self.statement.as_ref()
    }

    /// Replace the compiled handle, finalizing any previous one
    pub(crate) fn set_statement(&mut self, statement: Option<RawStatement>) {
        if let Some(old) = std::mem::replace(&mut self.statement, statement) {
            old.finalize();
        }
    }

    /// SQL text the statement was compiled from
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// How many times the statement has been handed out
    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn set_use_count(&mut self, use_count: u64) {
        self.use_count = use_count;
    }

    pub(crate) fn increment_use_count(&mut self) {
        self.use_count = self.use_count.saturating_add(1);
    }

    /// Whether a cursor or running update currently holds the statement
    pub fn in_use(&self) -> bool {
        self.in_use
    }

    pub fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    /// Whether the handle has been finalized
    pub fn is_closed(&self) -> bool {
        self.statement.is_none()
    }

    /// Clear bindings, rewind, and mark the statement available
    pub fn reset(&mut self) {
        if let Some(statement) = &self.statement {
            statement.reset();
        }
        self.in_use = false;
    }

    /// Finalize the handle; safe to call repeatedly
    pub fn close(&mut self) {
        self.set_statement(None);
        self.in_use = false;
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("use_count", &self.use_count)
            .field("in_use", &self.in_use)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        self.close();
    }
}

/// Snapshot of a cached statement, for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementInfo {
    pub id: StatementId,
    pub query: String,
    pub use_count: u64,
    pub in_use: bool,
}

impl From<&PreparedStatement> for StatementInfo {
    fn from(statement: &PreparedStatement) -> Self {
        Self {
            id: statement.id,
            query: statement.query.clone(),
            use_count: statement.use_count,
            in_use: statement.in_use,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::engine::{RawConnection, StepResult};
    use rusqlite::ffi;

    fn prepare(conn: &RawConnection, sql: &str) -> PreparedStatement {
        let c_sql = std::ffi::CString::new(sql).unwrap();
        let raw = conn.prepare(&c_sql).unwrap().unwrap();
        PreparedStatement::new(StatementId(1), raw, sql)
    }

    fn memory() -> RawConnection {
        RawConnection::open(
            ":memory:",
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_reset_keeps_handle() {
        let conn = memory();
        let mut stmt = prepare(&conn, "SELECT ?");
        stmt.set_in_use(true);
        stmt.statement().unwrap().bind_int(1, 7);
        assert_eq!(StepResult::from_code(stmt.statement().unwrap().step()), StepResult::Row);

        stmt.reset();
        assert!(!stmt.in_use());
        assert!(!stmt.is_closed());
        let raw = stmt.statement().unwrap();
        assert_eq!(StepResult::from_code(raw.step()), StepResult::Row);
        assert_eq!(raw.column_type(0), crate::backends::engine::ColumnType::Null);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = memory();
        let mut stmt = prepare(&conn, "SELECT 1");
        stmt.set_in_use(true);
        stmt.close();
        assert!(stmt.is_closed());
        assert!(stmt.statement().is_none());
        assert!(!stmt.in_use());
        stmt.close();
        stmt.reset();
        assert!(stmt.is_closed());
        assert_eq!(conn.close(), ffi::SQLITE_OK);
    }

    #[test]
    fn test_accessors_and_snapshot() {
        let conn = memory();
        let mut stmt = prepare(&conn, "SELECT 1");
        stmt.increment_use_count();
        stmt.increment_use_count();
        stmt.set_query("SELECT 2");
        assert_eq!(stmt.use_count(), 2);
        assert_eq!(stmt.query(), "SELECT 2");

        let info = StatementInfo::from(&stmt);
        assert_eq!(info.id, StatementId(1));
        assert_eq!(info.use_count, 2);
        assert!(!info.in_use);
        assert_eq!(stmt.id().to_string(), "stmt-1");
    }
}
