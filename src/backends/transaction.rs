//! Transaction guard for automatic rollback on drop
//!
//! This module provides RAII-style transaction management on a [`Session`].

use super::cursor::ResultCursor;
use super::session::Session;
use crate::core::{Result, Value};

/// Transaction guard that rolls back on drop unless committed
///
/// # Example
///
/// ```no_run
/// use rust_database_session::{Session, TransactionGuard, Value};
///
/// fn transfer(session: &Session) -> rust_database_session::Result<()> {
///     let tx = TransactionGuard::begin(session)?;
///     tx.execute_update("UPDATE accounts SET balance = balance - 100 WHERE id = ?", &[Value::Int(1)])?;
///     tx.execute_update("UPDATE accounts SET balance = balance + 100 WHERE id = ?", &[Value::Int(2)])?;
///     tx.commit()
/// }
/// ```
pub struct TransactionGuard<'a> {
    session: &'a Session,
    finished: bool,
}

impl<'a> TransactionGuard<'a> {
    /// Begin an exclusive transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed, busy, or already inside
    /// a transaction.
    pub fn begin(session: &'a Session) -> Result<Self> {
        session.begin_transaction()?;
        Ok(Self {
            session,
            finished: false,
        })
    }

    /// Begin a deferred transaction
    pub fn begin_deferred(session: &'a Session) -> Result<Self> {
        session.begin_deferred_transaction()?;
        Ok(Self {
            session,
            finished: false,
        })
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    /// Execute an update within the transaction
    pub fn execute_update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.session.execute_update(sql, params)
    }

    /// Query within the transaction
    pub fn execute_query(&self, sql: &str, params: &[Value]) -> Result<ResultCursor> {
        self.session.execute_query(sql, params)
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the guard then rolls back on drop.
    pub fn commit(mut self) -> Result<()> {
        self.session.commit()?;
        self.finished = true;
        Ok(())
    }

    /// Explicitly roll back the transaction
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.session.rollback()
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::warn!("transaction guard dropped without commit, rolling back");
        if let Err(e) = self.session.rollback() {
            tracing::error!(error = %e, "automatic rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let session = Session::in_memory();
        session.open().unwrap();
        session
            .execute_update("CREATE TABLE t (id INTEGER)", &[])
            .unwrap();
        session
    }

    fn count(session: &Session) -> i64 {
        session
            .long_for_query("SELECT count(*) FROM t", &[])
            .unwrap()
            .unwrap_or(0)
    }

    #[test]
    fn test_transaction_guard_commit() {
        let session = session();
        let tx = TransactionGuard::begin(&session).unwrap();
        tx.execute_update("INSERT INTO t VALUES (1)", &[]).unwrap();
        tx.commit().unwrap();
        assert!(!session.is_in_transaction());
        assert_eq!(count(&session), 1);
    }

    #[test]
    fn test_transaction_guard_auto_rollback() {
        let session = session();
        {
            let tx = TransactionGuard::begin(&session).unwrap();
            tx.execute_update("INSERT INTO t VALUES (1)", &[]).unwrap();
            assert!(tx.session().is_in_transaction());
        }
        assert!(!session.is_in_transaction());
        assert_eq!(count(&session), 0);
    }

    #[test]
    fn test_transaction_guard_explicit_rollback() {
        let session = session();
        let tx = TransactionGuard::begin_deferred(&session).unwrap();
        tx.execute_update("INSERT INTO t VALUES (1)", &[]).unwrap();
        let mut cursor = tx.execute_query("SELECT id FROM t", &[]).unwrap();
        assert!(cursor.next());
        cursor.close();
        tx.rollback().unwrap();
        assert_eq!(count(&session), 0);
    }

    #[test]
    fn test_nested_begin_fails() {
        let session = session();
        let _tx = TransactionGuard::begin(&session).unwrap();
        assert!(TransactionGuard::begin(&session).is_err());
    }
}
