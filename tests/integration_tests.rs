//! Integration tests for the session layer
//!
//! These tests exercise sessions against real SQLite databases:
//! - Lifecycle (open, close, reopen)
//! - Statement caching and cursor bookkeeping
//! - Busy/locked retry against a second connection
//! - Single-statement-in-flight enforcement and interrupts
//! - Transactions, savepoints and value binding

use rust_database_session::prelude::*;
use rust_database_session::OpenFlags;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn temp_db() -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.db").to_string_lossy().into_owned();
    (dir, path)
}

fn open(path: &str) -> Session {
    let session = Session::new(path);
    session.open().expect("Failed to open");
    session
}

#[test]
fn test_open_close_reopen_persists() {
    let (_dir, path) = temp_db();
    let session = open(&path);
    session.open().expect("Second open should be a no-op");
    session
        .execute_update("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .expect("Failed to create table");
    session
        .execute_update("INSERT INTO items (name) VALUES (?)", &[Value::from("first")])
        .expect("Failed to insert");

    session.close().expect("Failed to close");
    session.close().expect("Second close should be safe");
    assert!(!session.is_open());

    session.open().expect("Failed to reopen");
    let name = session
        .string_for_query("SELECT name FROM items WHERE id = ?", &[Value::Int(1)])
        .expect("Query failed");
    assert_eq!(name.as_deref(), Some("first"));
    assert_eq!(session.database_path(), path);
}

#[test]
fn test_drop_closes_session() {
    let (_dir, path) = temp_db();
    {
        let session = open(&path);
        session
            .execute_statements("CREATE TABLE t (x); INSERT INTO t VALUES (1);")
            .expect("Setup failed");
        let _cursor = session.execute_query("SELECT x FROM t", &[]).unwrap();
    }

    let session = open(&path);
    assert_eq!(
        session.long_for_query("SELECT count(*) FROM t", &[]).unwrap(),
        Some(1)
    );
}

#[test]
fn test_select_one_yields_one_row() {
    let session = Session::in_memory();
    session.open().unwrap();

    let mut cursor = session.execute_query("SELECT 1", &[]).unwrap();
    assert_eq!(cursor.query(), "SELECT 1");
    assert!(cursor.next());
    assert_eq!(cursor.long_for_column_index(0), 1);
    assert!(!cursor.next());
    assert!(cursor.is_closed());
    assert!(!session.has_open_result_sets());
}

#[test]
fn test_parameter_mismatch_then_success_with_cache() {
    let session = Session::with_config(
        ":memory:",
        SessionConfig::new().with_cache_statements(true),
    );
    session.open().unwrap();

    let err = session
        .execute_query("SELECT ?, ?", &[Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, DatabaseError::ParameterCountMismatch { .. }));
    assert!(!session.has_open_result_sets());
    assert!(session.cached_statements("SELECT ?, ?").is_empty());

    let mut cursor = session
        .execute_query("SELECT ?, ?", &[Value::Int(1), Value::Int(2)])
        .expect("Same SQL should prepare again");
    assert!(cursor.next());
    assert_eq!(cursor.int_for_column_index(0) + cursor.int_for_column_index(1), 3);
    cursor.close();

    let cached = session.cached_statements("SELECT ?, ?");
    assert_eq!(cached.len(), 1);
    assert!(!cached[0].in_use);
}

#[test]
fn test_statement_cache_with_concurrent_cursors() {
    let session = Session::in_memory();
    session.open().unwrap();
    session.set_cache_statements(true);
    session
        .execute_statements(
            "CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);",
        )
        .unwrap();
    let sql = "SELECT x FROM t ORDER BY x";

    let mut a = session.execute_query(sql, &[]).unwrap();
    let mut b = session.execute_query(sql, &[]).unwrap();
    let cached = session.cached_statements(sql);
    assert_eq!(cached.len(), 2);
    assert_ne!(cached[0].id, cached[1].id);

    // Interleaved iteration over two instances of the same SQL text
    assert!(a.next());
    assert!(b.next());
    assert!(a.next());
    assert_eq!(a.int_for_column("x"), 2);
    assert_eq!(b.int_for_column("x"), 1);

    a.close();
    let freed: Vec<_> = session
        .cached_statements(sql)
        .into_iter()
        .filter(|s| !s.in_use)
        .map(|s| s.id)
        .collect();
    assert_eq!(freed.len(), 1);

    let mut c = session.execute_query(sql, &[]).unwrap();
    let cached = session.cached_statements(sql);
    assert_eq!(cached.len(), 2);
    let reused = cached.iter().find(|s| s.id == freed[0]).unwrap();
    assert!(reused.in_use);
    assert_eq!(reused.use_count, 2);

    assert!(c.next());
    assert_eq!(c.int_for_column("x"), 1);
    b.close();
    c.close();
    assert_eq!(session.open_result_set_count(), 0);
}

#[test]
fn test_busy_with_zero_retry_fails_immediately() {
    let (_dir, path) = temp_db();
    let locker = open(&path);
    locker.execute_update("CREATE TABLE t (x)", &[]).unwrap();
    locker.begin_transaction().unwrap();

    let contender = Session::with_config(
        path.as_str(),
        SessionConfig::new().with_max_busy_retry(Duration::ZERO),
    );
    contender.open().unwrap();

    let start = Instant::now();
    let err = contender
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .unwrap_err();
    assert!(err.is_busy(), "expected busy, got {err}");
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(contender.busy_retry_sleeps(), 0);

    locker.rollback().unwrap();
    contender
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .expect("Insert should succeed once the lock is released");
}

#[test]
fn test_busy_retries_until_ceiling() {
    let (_dir, path) = temp_db();
    let locker = open(&path);
    locker.execute_update("CREATE TABLE t (x)", &[]).unwrap();
    locker.begin_transaction().unwrap();

    let contender = open(&path);
    contender.set_max_busy_retry(Duration::from_millis(300));

    let start = Instant::now();
    let err = contender
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .unwrap_err();
    assert!(err.is_busy(), "expected busy, got {err}");
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(contender.busy_retry_sleeps() > 0);
    assert!(!contender.is_in_transaction());
}

#[test]
fn test_busy_retry_succeeds_when_lock_released() {
    let (_dir, path) = temp_db();
    let locker = Arc::new(open(&path));
    locker.execute_update("CREATE TABLE t (x)", &[]).unwrap();
    locker.begin_transaction().unwrap();

    let releaser = {
        let locker = Arc::clone(&locker);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            locker.commit().unwrap();
        })
    };

    let contender = open(&path);
    contender.set_max_busy_retry(Duration::from_secs(5));
    contender
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .expect("Retry should outlast the lock");
    releaser.join().unwrap();
}

#[test]
fn test_second_statement_in_flight_is_rejected() {
    let session = Arc::new(Session::in_memory());
    session.open().unwrap();

    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            session.execute_update(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT count(*) FROM c",
                &[],
            )
        })
    };

    thread::sleep(Duration::from_millis(200));
    let err = session.execute_query("SELECT 1", &[]).unwrap_err();
    assert!(matches!(err, DatabaseError::StatementInFlight));
    assert!(err.is_usage_error());
    assert!(matches!(
        session.changes(),
        Err(DatabaseError::StatementInFlight)
    ));

    assert!(session.interrupt());
    let result = worker.join().unwrap();
    assert!(matches!(result, Err(DatabaseError::Interrupted(_))));

    let value = session.int_for_query("SELECT 1", &[]).unwrap();
    assert_eq!(value, Some(1));
}

#[test]
fn test_interrupt_handle_outlives_connection() {
    let session = Session::in_memory();
    let handle = session.interrupt_handle();
    assert!(!handle.interrupt());
    session.open().unwrap();
    assert!(handle.interrupt());
    session.close().unwrap();
    assert!(!handle.interrupt());
}

#[test]
fn test_nested_savepoints() {
    let session = Session::in_memory();
    session.open().unwrap();
    session.execute_update("CREATE TABLE t (x)", &[]).unwrap();

    session.begin_transaction().unwrap();
    session.start_savepoint("outer").unwrap();
    session.execute_update("INSERT INTO t VALUES (1)", &[]).unwrap();
    session.start_savepoint("inner").unwrap();
    session.execute_update("INSERT INTO t VALUES (2)", &[]).unwrap();
    session.rollback_to_savepoint("inner").unwrap();
    session.release_savepoint("inner").unwrap();
    session.release_savepoint("outer").unwrap();
    session.commit().unwrap();

    let rows = session.long_for_query("SELECT count(*) FROM t", &[]).unwrap();
    assert_eq!(rows, Some(1));

    let kept = session
        .in_savepoint("keep", |s| s.execute_update("INSERT INTO t VALUES (3)", &[]))
        .unwrap();
    assert_eq!(kept, 1);
    let rows = session.long_for_query("SELECT count(*) FROM t", &[]).unwrap();
    assert_eq!(rows, Some(2));
}

#[test]
fn test_transaction_guard_rolls_back_on_error() {
    fn transfer(session: &Session, fail: bool) -> Result<()> {
        let tx = TransactionGuard::begin(session)?;
        tx.execute_update("UPDATE accounts SET balance = balance - 10 WHERE id = 1", &[])?;
        if fail {
            return Err(DatabaseError::other("simulated failure"));
        }
        tx.execute_update("UPDATE accounts SET balance = balance + 10 WHERE id = 2", &[])?;
        tx.commit()
    }

    let session = Session::in_memory();
    session.open().unwrap();
    session
        .execute_statements(
            "CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER);
             INSERT INTO accounts VALUES (1, 100), (2, 0);",
        )
        .unwrap();

    assert!(transfer(&session, true).is_err());
    assert_eq!(
        session.long_for_query("SELECT balance FROM accounts WHERE id = 1", &[]).unwrap(),
        Some(100)
    );

    transfer(&session, false).unwrap();
    assert_eq!(
        session.long_for_query("SELECT balance FROM accounts WHERE id = 2", &[]).unwrap(),
        Some(10)
    );
}

#[test]
fn test_value_binding_storage_classes() {
    let session = Session::in_memory();
    session.open().unwrap();

    let cases = [
        (Value::None, "null"),
        (Value::Bool(true), "integer"),
        (Value::Byte(7), "integer"),
        (Value::UInt64(42), "integer"),
        (Value::Float(0.5), "real"),
        (Value::from("hello"), "text"),
        (Value::Blob(vec![]), "blob"),
        (Value::Blob(vec![0xde, 0xad]), "blob"),
    ];
    for (value, expected) in cases {
        let kind = session
            .string_for_query("SELECT typeof(?)", &[value.clone()])
            .unwrap();
        assert_eq!(kind.as_deref(), Some(expected), "binding {value:?}");
    }

    let err = session
        .execute_update("SELECT ?", &[Value::List(vec![Value::Int(1)])])
        .unwrap_err();
    assert!(matches!(err, DatabaseError::UnsupportedBinding(ValueKind::List)));
}

#[test]
fn test_timestamp_binding_modes() {
    let session = Session::in_memory();
    session.open().unwrap();
    session.execute_update("CREATE TABLE events (at)", &[]).unwrap();
    let ts = Timestamp::from_unix_seconds(1_750_000_000.0);

    session
        .execute_update("INSERT INTO events VALUES (?)", &[Value::Timestamp(ts)])
        .unwrap();
    session.set_timestamp_binding(TimestampBinding::UnixSeconds);
    session
        .execute_update("INSERT INTO events VALUES (?)", &[Value::Timestamp(ts)])
        .unwrap();

    let kinds = session
        .string_for_query("SELECT group_concat(typeof(at)) FROM events", &[])
        .unwrap();
    assert_eq!(kinds.as_deref(), Some("text,real"));

    session.set_timestamp_binding(TimestampBinding::Text);
    let mut cursor = session.execute_query("SELECT at FROM events", &[]).unwrap();
    let mut decoded = Vec::new();
    while cursor.next() {
        decoded.push(cursor.timestamp_for_column("at"));
    }
    assert_eq!(decoded, vec![Some(ts), Some(ts)]);
}

#[test]
fn test_read_only_open() {
    let (_dir, path) = temp_db();
    {
        let session = open(&path);
        session.execute_update("CREATE TABLE t (x)", &[]).unwrap();
    }

    let session = Session::new(path.as_str());
    session
        .open_with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY)
        .unwrap();
    let err = session
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .unwrap_err();
    assert_eq!(
        err.sqlite_code(),
        Some(rusqlite::ffi::ErrorCode::ReadOnly)
    );
    assert!(session.had_error());
}

#[test]
fn test_error_surface_after_constraint_violation() {
    let session = Session::in_memory();
    session.open().unwrap();
    session
        .execute_update("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[])
        .unwrap();
    session.execute_update("INSERT INTO t VALUES (1)", &[]).unwrap();

    let err = session
        .execute_update("INSERT INTO t VALUES (1)", &[])
        .unwrap_err();
    assert_eq!(
        err.sqlite_code(),
        Some(rusqlite::ffi::ErrorCode::ConstraintViolation)
    );
    assert!(!err.is_usage_error());
    assert!(session.is_good_connection());
}
