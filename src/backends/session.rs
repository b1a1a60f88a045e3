//! SQLite session
//!
//! A [`Session`] owns one engine connection, the prepared-statement cache,
//! the table of open cursors and the busy-retry policy. Only one statement
//! may be prepared or executed at a time; a second caller gets
//! [`DatabaseError::StatementInFlight`] immediately instead of waiting.
//!
//! # Example
//!
//! ```no_run
//! use rust_database_session::{Session, Value};
//!
//! # fn main() -> rust_database_session::Result<()> {
//! let session = Session::new("app.db");
//! session.open()?;
//! session.execute_update("CREATE TABLE IF NOT EXISTS users (name TEXT)", &[])?;
//! session.execute_update("INSERT INTO users VALUES (?)", &[Value::from("Alice")])?;
//!
//! let mut cursor = session.execute_query("SELECT name FROM users", &[])?;
//! while cursor.next() {
//!     println!("{:?}", cursor.string_for_column("name"));
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

use super::binding::bind_value;
use super::busy::{busy_handler, BusyRetry};
use super::cursor::{CursorId, ResultCursor};
use super::engine::{error_string, InterruptHandle, RawConnection, RawStatement, StepResult};
use super::statement::{PreparedStatement, StatementId, StatementInfo};
use crate::core::{DatabaseError, Result, SessionConfig, TimestampBinding, Value};
use parking_lot::Mutex;
use rusqlite::{ffi, OpenFlags};
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Path that opens a private in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// State shared between a session and its cursors
pub(crate) struct SessionInner {
    path: String,
    config: SessionConfig,
    statements: HashMap<StatementId, PreparedStatement>,
    cache: HashMap<String, Vec<StatementId>>,
    open_cursors: HashMap<CursorId, StatementId>,
    connection: Option<RawConnection>,
    busy: Arc<BusyRetry>,
    in_transaction: bool,
    next_id: u64,
}

impl SessionInner {
    fn new(path: String, config: SessionConfig) -> Self {
        let busy = Arc::new(BusyRetry::new(config.max_busy_retry));
        Self {
            path,
            config,
            statements: HashMap::new(),
            cache: HashMap::new(),
            open_cursors: HashMap::new(),
            connection: None,
            busy,
            in_transaction: false,
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Log `err`, abort if it is fatal and the session asks for that, and
    /// hand it back
    pub(crate) fn fail(&self, err: DatabaseError, sql: &str, fatal: bool) -> DatabaseError {
        if err.is_usage_error() {
            tracing::warn!(path = %self.path, sql = %sql, error = %err, "database usage error");
        } else if self.config.logs_errors {
            tracing::error!(
                path = %self.path,
                sql = %sql,
                code = ?err.extended_code(),
                error = %err,
                "database error"
            );
        }
        if fatal && self.config.crash_on_errors {
            tracing::error!(path = %self.path, "crash_on_errors is set, aborting");
            std::process::abort();
        }
        err
    }

    fn connection(&self, sql: &str) -> Result<&RawConnection> {
        self.connection
            .as_ref()
            .ok_or_else(|| self.fail(DatabaseError::not_open(&self.path), sql, true))
    }

    /// The connection's last error as a [`DatabaseError`]
    fn engine_error(&self) -> DatabaseError {
        match &self.connection {
            Some(conn) => DatabaseError::engine(conn.extended_errcode(), conn.errmsg()),
            None => DatabaseError::not_open(&self.path),
        }
    }

    /// Build, log and possibly abort on a failed step
    pub(crate) fn step_failure(&self, result: StepResult, sql: &str) -> DatabaseError {
        match result {
            StepResult::Interrupted => {
                let message = self
                    .connection
                    .as_ref()
                    .map(RawConnection::errmsg)
                    .unwrap_or_else(|| error_string(ffi::SQLITE_INTERRUPT));
                self.fail(DatabaseError::Interrupted(message), sql, false)
            }
            StepResult::Busy | StepResult::Locked => self.fail(self.engine_error(), sql, false),
            StepResult::Row => self.fail(DatabaseError::UnexpectedRow(sql.to_string()), sql, false),
            StepResult::Done => self.fail(
                DatabaseError::other("statement finished without an error"),
                sql,
                false,
            ),
            StepResult::Error(_) | StepResult::Misuse => self.fail(self.engine_error(), sql, true),
        }
    }

    fn is_cached(&self, id: StatementId) -> bool {
        self.statements
            .get(&id)
            .and_then(|statement| self.cache.get(statement.query()))
            .is_some_and(|ids| ids.contains(&id))
    }

    /// First cached statement for `sql` that no cursor holds
    fn cached_statement_for(&self, sql: &str) -> Option<StatementId> {
        self.cache.get(sql)?.iter().copied().find(|id| {
            self.statements
                .get(id)
                .is_some_and(|statement| !statement.in_use() && !statement.is_closed())
        })
    }

    /// Hand a statement back: cached statements are reset, others finalized
    fn release_statement(&mut self, id: StatementId) {
        if self.is_cached(id) {
            if let Some(statement) = self.statements.get_mut(&id) {
                statement.reset();
            }
        } else if let Some(mut statement) = self.statements.remove(&id) {
            statement.close();
        }
    }

    /// Find or compile a statement for `sql` and bind `params` to it
    fn prepare_and_bind(&mut self, sql: &str, params: &[Value]) -> Result<StatementId> {
        self.connection(sql)?;
        if self.config.trace_execution {
            tracing::debug!(path = %self.path, sql = %sql, params = params.len(), "executing statement");
        }

        let cached = if self.config.cache_statements {
            self.cached_statement_for(sql)
        } else {
            None
        };

        let (id, fresh) = match cached {
            Some(id) => {
                if let Some(statement) = self.statements.get_mut(&id) {
                    statement.reset();
                }
                (id, false)
            }
            None => {
                let c_sql = CString::new(sql).map_err(|e| self.fail(e.into(), sql, false))?;
                let prepared = self.connection(sql)?.prepare(&c_sql);
                let raw = match prepared {
                    Ok(Some(raw)) => raw,
                    Ok(None) => {
                        let err = DatabaseError::engine(ffi::SQLITE_MISUSE, "not an SQL statement");
                        return Err(self.fail(err, sql, false));
                    }
                    Err(_) => return Err(self.fail(self.engine_error(), sql, true)),
                };
                let id = StatementId(self.next_id());
                self.statements
                    .insert(id, PreparedStatement::new(id, raw, sql));
                (id, true)
            }
        };

        if let Err(err) = self.bind_parameters(id, params) {
            // A statement that never bound cleanly is not worth caching
            if fresh {
                if let Some(mut statement) = self.statements.remove(&id) {
                    statement.close();
                }
            } else {
                self.release_statement(id);
            }
            let fatal = matches!(err, DatabaseError::UnsupportedBinding(_));
            return Err(self.fail(err, sql, fatal));
        }
        if fresh && self.config.cache_statements {
            self.cache.entry(sql.to_string()).or_default().push(id);
        }
        Ok(id)
    }

    fn bind_parameters(&self, id: StatementId, params: &[Value]) -> Result<()> {
        let raw = self
            .statements
            .get(&id)
            .and_then(PreparedStatement::statement)
            .ok_or_else(|| DatabaseError::other(format!("statement {id} is closed")))?;

        let expected = raw.parameter_count();
        if expected != params.len() {
            return Err(DatabaseError::ParameterCountMismatch {
                expected,
                actual: params.len(),
            });
        }
        for (offset, value) in params.iter().enumerate() {
            bind_value(raw, offset + 1, value, self.config.timestamp_binding)?;
        }
        Ok(())
    }

    /// Step an update statement once, expecting completion
    fn step_to_completion(&self, id: StatementId, sql: &str) -> Result<u64> {
        let raw = self
            .statements
            .get(&id)
            .and_then(PreparedStatement::statement)
            .ok_or_else(|| DatabaseError::other(format!("statement {id} is closed")))?;

        match StepResult::from_code(raw.step()) {
            StepResult::Done => Ok(self.connection.as_ref().map_or(0, RawConnection::changes)),
            result => Err(self.step_failure(result, sql)),
        }
    }

    pub(crate) fn is_cursor_open(&self, cursor: CursorId) -> bool {
        self.open_cursors.contains_key(&cursor)
    }

    /// Statement behind an open cursor
    pub(crate) fn cursor_statement(&self, cursor: CursorId) -> Option<&RawStatement> {
        let id = self.open_cursors.get(&cursor)?;
        self.statements.get(id)?.statement()
    }

    /// Forget a cursor and hand its statement back
    pub(crate) fn result_set_did_close(&mut self, cursor: CursorId) {
        if let Some(id) = self.open_cursors.remove(&cursor) {
            self.release_statement(id);
        }
    }

    /// Drop every cached statement no cursor is holding; held ones are
    /// finalized when their cursor closes
    fn clear_cached_statements(&mut self) {
        let ids: Vec<StatementId> = self.cache.drain().flat_map(|(_, ids)| ids).collect();
        for id in ids {
            if self.statements.get(&id).is_some_and(|s| !s.in_use()) {
                if let Some(mut statement) = self.statements.remove(&id) {
                    statement.close();
                }
            }
        }
    }

    fn install_busy_handler(&self) {
        let Some(conn) = &self.connection else {
            return;
        };
        if self.busy.max_retry().is_zero() {
            conn.clear_busy_handler();
        } else {
            let context = Arc::as_ptr(&self.busy).cast_mut().cast::<c_void>();
            conn.set_busy_handler(busy_handler, context);
        }
    }

    /// Close cursors, then cached statements, then the connection
    fn close(&mut self, interrupt: &InterruptHandle) {
        let cursors: Vec<StatementId> = self.open_cursors.drain().map(|(_, id)| id).collect();
        for id in cursors {
            self.release_statement(id);
        }

        for (_, mut statement) in self.statements.drain() {
            statement.close();
        }
        self.cache.clear();
        self.in_transaction = false;

        let Some(mut conn) = self.connection.take() else {
            return;
        };
        interrupt.detach();

        loop {
            let rc = conn.close();
            if rc == ffi::SQLITE_OK {
                tracing::debug!(path = %self.path, "database closed");
                break;
            }
            if rc == ffi::SQLITE_BUSY || rc == ffi::SQLITE_LOCKED {
                let finalized = conn.finalize_outstanding();
                if finalized > 0 {
                    tracing::warn!(
                        path = %self.path,
                        count = finalized,
                        "finalized leaked statements while closing"
                    );
                    continue;
                }
            }
            if self.config.logs_errors {
                tracing::error!(
                    path = %self.path,
                    code = rc,
                    message = %error_string(rc),
                    "error closing database"
                );
            }
            break;
        }
    }
}

/// Clears the in-flight flag on every exit path
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A connection to one SQLite database file
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    executing: AtomicBool,
    crash_on_errors: AtomicBool,
    interrupt: InterruptHandle,
}

impl Session {
    /// Create a closed session for `path` with default configuration
    ///
    /// `":memory:"` opens a private in-memory database and an empty path a
    /// private temporary file.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_config(path, SessionConfig::default())
    }

    /// Create a closed session with explicit configuration
    pub fn with_config(path: impl Into<String>, config: SessionConfig) -> Self {
        let crash_on_errors = AtomicBool::new(config.crash_on_errors);
        Self {
            inner: Arc::new(Mutex::new(SessionInner::new(path.into(), config))),
            executing: AtomicBool::new(false),
            crash_on_errors,
            interrupt: InterruptHandle::new(),
        }
    }

    /// Create a closed session for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    /// Create a closed session for a private temporary file
    pub fn temporary() -> Self {
        Self::new("")
    }

    pub fn database_path(&self) -> String {
        self.inner.lock().path.clone()
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SessionConfig {
        self.inner.lock().config.clone()
    }

    pub fn set_logs_errors(&self, value: bool) {
        self.inner.lock().config.logs_errors = value;
    }

    pub fn set_crash_on_errors(&self, value: bool) {
        self.inner.lock().config.crash_on_errors = value;
        self.crash_on_errors.store(value, Ordering::Release);
    }

    pub fn set_trace_execution(&self, value: bool) {
        self.inner.lock().config.trace_execution = value;
    }

    /// Turn statement caching on or off; turning it off empties the cache
    pub fn set_cache_statements(&self, value: bool) {
        let mut inner = self.inner.lock();
        inner.config.cache_statements = value;
        if !value {
            inner.clear_cached_statements();
        }
    }

    pub fn set_timestamp_binding(&self, binding: TimestampBinding) {
        self.inner.lock().config.timestamp_binding = binding;
    }

    pub fn max_busy_retry(&self) -> Duration {
        self.inner.lock().busy.max_retry()
    }

    /// Set how long to keep retrying a busy database
    ///
    /// Takes effect immediately on an open session; zero makes contention
    /// fail at once.
    pub fn set_max_busy_retry(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        inner.config.max_busy_retry = timeout;
        inner.busy.set_max_retry(timeout);
        inner.install_busy_handler();
    }

    /// Handle that can interrupt this session from another thread
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Interrupt the running statement, if any
    pub fn interrupt(&self) -> bool {
        self.interrupt.interrupt()
    }

    /// Mark a statement as in flight, or fail if one already is
    fn begin_statement(&self) -> Result<InFlightGuard<'_>> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("session is currently in use by another statement");
            if self.crash_on_errors.load(Ordering::Acquire) {
                std::process::abort();
            }
            return Err(DatabaseError::StatementInFlight);
        }
        Ok(InFlightGuard {
            flag: &self.executing,
        })
    }

    /// Open the database for reading and writing, creating it if needed
    pub fn open(&self) -> Result<()> {
        self.open_with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE)
    }

    pub fn open_with_flags(&self, flags: OpenFlags) -> Result<()> {
        self.open_with_flags_and_vfs(flags, None)
    }

    /// Open with explicit flags and VFS; a no-op if already open
    pub fn open_with_flags_and_vfs(&self, flags: OpenFlags, vfs: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.connection.is_some() {
            return Ok(());
        }

        let conn = match RawConnection::open(&inner.path, flags.bits(), vfs) {
            Ok(conn) => conn,
            Err((code, message)) => {
                if inner.config.logs_errors {
                    tracing::error!(path = %inner.path, code, message = %message, "failed to open database");
                }
                return Err(DatabaseError::OpenFailed {
                    path: inner.path.clone(),
                    message: message.clone(),
                    source: Some(rusqlite::Error::SqliteFailure(
                        ffi::Error::new(code),
                        Some(message),
                    )),
                });
            }
        };

        self.interrupt.attach(&conn);
        inner.connection = Some(conn);
        inner.install_busy_handler();
        tracing::debug!(path = %inner.path, "database opened");
        Ok(())
    }

    /// Close cursors, cached statements and the connection
    ///
    /// Safe to call on a closed session. Outstanding cursors are detached
    /// and report themselves closed.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close(&self.interrupt);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    /// Whether the connection can still run a trivial schema query
    pub fn is_good_connection(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.execute_query("select name from sqlite_master where type='table'", &[]) {
            Ok(mut cursor) => {
                cursor.close();
                true
            }
            Err(_) => false,
        }
    }

    /// Run a query and return a cursor over its rows
    pub fn execute_query(&self, sql: &str, params: &[Value]) -> Result<ResultCursor> {
        let _guard = self.begin_statement()?;
        let mut inner = self.inner.lock();
        let statement = inner.prepare_and_bind(sql, params)?;

        let cursor = CursorId(inner.next_id());
        if let Some(prepared) = inner.statements.get_mut(&statement) {
            prepared.set_in_use(true);
            prepared.increment_use_count();
        }
        inner.open_cursors.insert(cursor, statement);
        let timestamps = inner.config.timestamp_binding;
        drop(inner);

        Ok(ResultCursor::new(cursor, &self.inner, sql, timestamps))
    }

    /// Run a statement to completion; returns the number of changed rows
    pub fn execute_update(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let _guard = self.begin_statement()?;
        let mut inner = self.inner.lock();
        let statement = inner.prepare_and_bind(sql, params)?;

        let result = inner.step_to_completion(statement, sql);
        if let Some(prepared) = inner.statements.get_mut(&statement) {
            prepared.increment_use_count();
        }
        inner.release_statement(statement);
        result
    }

    /// Run a script of one or more statements, discarding any rows
    pub fn execute_statements(&self, sql: &str) -> Result<()> {
        let _guard = self.begin_statement()?;
        let inner = self.inner.lock();
        let conn = inner.connection(sql)?;
        if inner.config.trace_execution {
            tracing::debug!(path = %inner.path, sql = %sql, "executing statements");
        }
        let c_sql = CString::new(sql).map_err(|e| inner.fail(e.into(), sql, false))?;
        conn.exec(&c_sql).map_err(|(_, message)| {
            let err = DatabaseError::engine(conn.extended_errcode(), message);
            inner.fail(err, sql, false)
        })
    }

    pub fn last_error_message(&self) -> String {
        match &self.inner.lock().connection {
            Some(conn) => conn.errmsg(),
            None => "database is not open".to_string(),
        }
    }

    pub fn last_error_code(&self) -> i32 {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map_or(ffi::SQLITE_MISUSE, RawConnection::errcode)
    }

    pub fn last_extended_error_code(&self) -> i32 {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map_or(ffi::SQLITE_MISUSE, RawConnection::extended_errcode)
    }

    /// Whether the last engine call on this connection failed
    pub fn had_error(&self) -> bool {
        let code = self.last_error_code();
        code > ffi::SQLITE_OK && code < ffi::SQLITE_ROW
    }

    /// Row id of the most recent successful insert
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let _guard = self.begin_statement()?;
        let inner = self.inner.lock();
        Ok(inner.connection("last_insert_rowid")?.last_insert_rowid())
    }

    /// Rows changed by the most recent statement
    pub fn changes(&self) -> Result<u64> {
        let _guard = self.begin_statement()?;
        let inner = self.inner.lock();
        Ok(inner.connection("changes")?.changes())
    }

    pub fn is_in_transaction(&self) -> bool {
        self.inner.lock().in_transaction
    }

    fn run_transaction_statement(&self, sql: &str, in_transaction: bool) -> Result<()> {
        self.execute_update(sql, &[])?;
        self.inner.lock().in_transaction = in_transaction;
        Ok(())
    }

    /// Begin an exclusive transaction
    pub fn begin_transaction(&self) -> Result<()> {
        self.run_transaction_statement("begin exclusive transaction", true)
    }

    /// Begin a deferred transaction
    pub fn begin_deferred_transaction(&self) -> Result<()> {
        self.run_transaction_statement("begin deferred transaction", true)
    }

    pub fn commit(&self) -> Result<()> {
        self.run_transaction_statement("commit transaction", false)
    }

    pub fn rollback(&self) -> Result<()> {
        self.run_transaction_statement("rollback transaction", false)
    }

    fn savepoint_sql(template: &str, name: &str) -> Result<String> {
        if name.is_empty() {
            return Err(DatabaseError::transaction("savepoint name must not be empty"));
        }
        Ok(format!("{template} '{}'", name.replace('\'', "''")))
    }

    pub fn start_savepoint(&self, name: &str) -> Result<()> {
        let sql = Self::savepoint_sql("savepoint", name)?;
        self.execute_update(&sql, &[]).map(|_| ())
    }

    pub fn release_savepoint(&self, name: &str) -> Result<()> {
        let sql = Self::savepoint_sql("release savepoint", name)?;
        self.execute_update(&sql, &[]).map(|_| ())
    }

    pub fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let sql = Self::savepoint_sql("rollback transaction to savepoint", name)?;
        self.execute_update(&sql, &[]).map(|_| ())
    }

    /// Run `f` inside a savepoint
    ///
    /// The savepoint is released when `f` succeeds. When it fails, changes
    /// are rolled back to the savepoint before it is released.
    pub fn in_savepoint<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Session) -> Result<T>,
    {
        self.start_savepoint(name)?;
        match f(self) {
            Ok(value) => {
                self.release_savepoint(name)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_to_savepoint(name) {
                    tracing::warn!(savepoint = %name, error = %rollback_err, "rollback to savepoint failed");
                }
                if let Err(release_err) = self.release_savepoint(name) {
                    tracing::warn!(savepoint = %name, error = %release_err, "release savepoint failed");
                }
                Err(err)
            }
        }
    }

    /// First column of the first row, read with `read`
    fn first_column<T>(
        &self,
        sql: &str,
        params: &[Value],
        read: impl FnOnce(&ResultCursor) -> T,
    ) -> Result<Option<T>> {
        let mut cursor = self.execute_query(sql, params)?;
        let value = if cursor.try_next()? && !cursor.column_is_null(0) {
            Some(read(&cursor))
        } else {
            None
        };
        cursor.close();
        Ok(value)
    }

    pub fn int_for_query(&self, sql: &str, params: &[Value]) -> Result<Option<i32>> {
        self.first_column(sql, params, |c| c.int_for_column_index(0))
    }

    pub fn long_for_query(&self, sql: &str, params: &[Value]) -> Result<Option<i64>> {
        self.first_column(sql, params, |c| c.long_for_column_index(0))
    }

    pub fn double_for_query(&self, sql: &str, params: &[Value]) -> Result<Option<f64>> {
        self.first_column(sql, params, |c| c.double_for_column_index(0))
    }

    pub fn string_for_query(&self, sql: &str, params: &[Value]) -> Result<Option<String>> {
        Ok(self
            .first_column(sql, params, |c| c.string_for_column_index(0))?
            .flatten())
    }

    /// Case-insensitive check for a table named `name`
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let count = self.long_for_query(
            "select count(*) from sqlite_master where type = 'table' and lower(name) = ?",
            &[Value::from(name.to_lowercase())],
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    pub fn application_id(&self) -> Result<i32> {
        Ok(self.int_for_query("PRAGMA application_id", &[])?.unwrap_or(0))
    }

    pub fn set_application_id(&self, id: i32) -> Result<()> {
        self.execute_update(&format!("PRAGMA application_id = {id}"), &[])
            .map(|_| ())
    }

    pub fn user_version(&self) -> Result<i32> {
        Ok(self.int_for_query("PRAGMA user_version", &[])?.unwrap_or(0))
    }

    pub fn set_user_version(&self, version: i32) -> Result<()> {
        self.execute_update(&format!("PRAGMA user_version = {version}"), &[])
            .map(|_| ())
    }

    /// Unlock an encrypted database; requires the `sqlcipher` feature
    pub fn set_key(&self, key: &str) -> Result<()> {
        self.apply_key("key", key)
    }

    /// Change the key of an encrypted database; requires the `sqlcipher` feature
    pub fn re_key(&self, key: &str) -> Result<()> {
        self.apply_key("rekey", key)
    }

    fn apply_key(&self, pragma: &str, key: &str) -> Result<()> {
        if !cfg!(feature = "sqlcipher") {
            return Err(DatabaseError::unsupported(
                "encryption requires the sqlcipher feature",
            ));
        }
        if key.is_empty() {
            return Err(DatabaseError::unsupported("empty encryption key"));
        }
        self.execute_statements(&format!("PRAGMA {pragma} = '{}'", key.replace('\'', "''")))
    }

    pub fn has_open_result_sets(&self) -> bool {
        !self.inner.lock().open_cursors.is_empty()
    }

    pub fn open_result_set_count(&self) -> usize {
        self.inner.lock().open_cursors.len()
    }

    /// Snapshot of the cached statements for `sql`
    pub fn cached_statements(&self, sql: &str) -> Vec<StatementInfo> {
        let inner = self.inner.lock();
        inner
            .cache
            .get(sql)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.statements.get(id))
                    .map(StatementInfo::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of cached statements across all SQL texts
    pub fn cached_statement_count(&self) -> usize {
        self.inner.lock().cache.values().map(Vec::len).sum()
    }

    /// Backoff sleeps the busy handler has taken on this session
    pub fn busy_retry_sleeps(&self) -> u64 {
        self.inner.lock().busy.sleeps()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("path", &inner.path)
            .field("open", &inner.connection.is_some())
            .field("open_cursors", &inner.open_cursors.len())
            .field("cached_statements", &inner.statements.len())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
