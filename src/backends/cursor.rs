//! Result cursors
//!
//! A [`ResultCursor`] iterates the rows of one executed query. It refers to
//! its session weakly and to its statement by id, so a cursor that outlives
//! its session, or that the session force-closed, simply reports itself
//! closed. Closing a cursor hands the statement back to the session's cache
//! (or finalizes it when caching is off).

use super::engine::{ColumnType, RawStatement, StepResult};
use super::session::SessionInner;
use crate::core::{DatabaseError, Result, Timestamp, TimestampBinding, Value, ValueMap};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Identifier of an open cursor within its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorId(pub(crate) u64);

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor-{}", self.0)
    }
}

/// Forward-only iterator over the rows of a query
pub struct ResultCursor {
    id: CursorId,
    session: Option<Weak<Mutex<SessionInner>>>,
    query: String,
    timestamps: TimestampBinding,
    columns: OnceCell<HashMap<String, usize>>,
    has_row: bool,
}

impl ResultCursor {
    pub(crate) fn new(
        id: CursorId,
        session: &Arc<Mutex<SessionInner>>,
        query: impl Into<String>,
        timestamps: TimestampBinding,
    ) -> Self {
        Self {
            id,
            session: Some(Arc::downgrade(session)),
            query: query.into(),
            timestamps,
            columns: OnceCell::new(),
            has_row: false,
        }
    }

    pub fn id(&self) -> CursorId {
        self.id
    }

    /// SQL text the cursor was produced from
    pub fn query(&self) -> &str {
        &self.query
    }

    fn upgrade(&self) -> Option<Arc<Mutex<SessionInner>>> {
        self.session.as_ref().and_then(Weak::upgrade)
    }

    /// Whether the cursor has been closed, by itself or by its session
    pub fn is_closed(&self) -> bool {
        match self.upgrade() {
            Some(session) => !session.lock().is_cursor_open(self.id),
            None => true,
        }
    }

    /// Advance to the next row
    ///
    /// Returns `false` when the rows are exhausted or the step failed; the
    /// cursor is closed in either case. Calling again after that is a no-op
    /// returning `false`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.try_next().unwrap_or(false)
    }

    /// Advance to the next row, surfacing step failures
    pub fn try_next(&mut self) -> Result<bool> {
        let Some(session) = self.upgrade() else {
            self.detach();
            return Err(DatabaseError::CursorClosed);
        };

        let outcome = {
            let inner = session.lock();
            match inner.cursor_statement(self.id) {
                None => Err(DatabaseError::CursorClosed),
                Some(statement) => {
                    let rc = statement.step();
                    match StepResult::from_code(rc) {
                        StepResult::Row => Ok(true),
                        StepResult::Done => Ok(false),
                        result => Err(inner.step_failure(result, &self.query)),
                    }
                }
            }
        };

        self.has_row = matches!(outcome, Ok(true));
        if !self.has_row {
            self.close_in(&session);
        }
        outcome
    }

    /// Whether the last advance produced a row
    pub fn has_another_row(&self) -> bool {
        self.has_row && !self.is_closed()
    }

    /// Release the statement back to the session; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(session) = self.upgrade() {
            self.close_in(&session);
        }
        self.detach();
    }

    fn close_in(&mut self, session: &Arc<Mutex<SessionInner>>) {
        session.lock().result_set_did_close(self.id);
        self.detach();
    }

    fn detach(&mut self) {
        self.session = None;
        self.has_row = false;
    }

    /// Run `f` against the current row's statement
    fn with_statement<T>(&self, f: impl FnOnce(&RawStatement) -> T) -> Option<T> {
        let session = self.upgrade()?;
        let inner = session.lock();
        inner.cursor_statement(self.id).map(f)
    }

    fn with_column<T>(&self, index: usize, f: impl FnOnce(&RawStatement) -> T) -> Option<T> {
        if !self.has_row {
            return None;
        }
        self.with_statement(|statement| {
            if index < statement.column_count() {
                Some(f(statement))
            } else {
                None
            }
        })
        .flatten()
    }

    pub fn column_count(&self) -> usize {
        self.with_statement(RawStatement::column_count).unwrap_or(0)
    }

    pub fn column_name_for_index(&self, index: usize) -> Option<String> {
        self.with_statement(|statement| statement.column_name(index))
            .flatten()
    }

    fn column_map(&self) -> &HashMap<String, usize> {
        self.columns.get_or_init(|| {
            self.with_statement(|statement| {
                let mut map = HashMap::new();
                for index in 0..statement.column_count() {
                    if let Some(name) = statement.column_name(index) {
                        map.entry(name.to_lowercase()).or_insert(index);
                    }
                }
                map
            })
            .unwrap_or_default()
        })
    }

    /// Case-insensitive column lookup
    pub fn column_index_for_name(&self, name: &str) -> Option<usize> {
        let index = self.column_map().get(&name.to_lowercase()).copied();
        if index.is_none() {
            tracing::warn!(column = %name, query = %self.query, "no column with this name");
        }
        index
    }

    pub fn column_is_null(&self, index: usize) -> bool {
        self.with_column(index, |s| s.column_type(index) == ColumnType::Null)
            .unwrap_or(true)
    }

    pub fn int_for_column_index(&self, index: usize) -> i32 {
        self.with_column(index, |s| s.column_int(index)).unwrap_or(0)
    }

    pub fn long_for_column_index(&self, index: usize) -> i64 {
        self.with_column(index, |s| s.column_int64(index)).unwrap_or(0)
    }

    pub fn double_for_column_index(&self, index: usize) -> f64 {
        self.with_column(index, |s| s.column_double(index)).unwrap_or(0.0)
    }

    pub fn bool_for_column_index(&self, index: usize) -> bool {
        self.long_for_column_index(index) != 0
    }

    /// Text of the column; `None` for NULL or an out-of-range index
    pub fn string_for_column_index(&self, index: usize) -> Option<String> {
        self.with_column(index, |s| match s.column_type(index) {
            ColumnType::Null => None,
            _ => s.column_text(index),
        })
        .flatten()
    }

    /// Bytes of the column; `None` for NULL or an out-of-range index
    pub fn data_for_column_index(&self, index: usize) -> Option<Vec<u8>> {
        self.with_column(index, |s| match s.column_type(index) {
            ColumnType::Null => None,
            _ => s.column_blob(index),
        })
        .flatten()
    }

    /// Decode a timestamp written in either binding mode
    ///
    /// Numeric columns are read as Unix seconds; text columns follow the
    /// cursor's binding mode.
    pub fn timestamp_for_column_index(&self, index: usize) -> Option<Timestamp> {
        let timestamps = self.timestamps;
        self.with_column(index, |s| match s.column_type(index) {
            ColumnType::Integer | ColumnType::Float => {
                Some(Timestamp::from_unix_seconds(s.column_double(index)))
            }
            ColumnType::Text => {
                let text = s.column_text(index)?;
                match timestamps {
                    TimestampBinding::Text => Timestamp::parse(&text).ok(),
                    TimestampBinding::UnixSeconds => text
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .map(Timestamp::from_unix_seconds),
                }
            }
            ColumnType::Blob | ColumnType::Null => None,
        })
        .flatten()
    }

    /// The column as a dynamic value, following its storage class
    pub fn value_for_column_index(&self, index: usize) -> Value {
        self.with_column(index, |s| match s.column_type(index) {
            ColumnType::Integer => Value::Int64(s.column_int64(index)),
            ColumnType::Float => Value::Double(s.column_double(index)),
            ColumnType::Text => s.column_text(index).map(Value::String).unwrap_or_default(),
            ColumnType::Blob => Value::Blob(s.column_blob(index).unwrap_or_default()),
            ColumnType::Null => Value::None,
        })
        .unwrap_or_default()
    }

    /// The current row keyed by column name
    pub fn row_values(&self) -> ValueMap {
        let mut row = ValueMap::new();
        for index in 0..self.column_count() {
            if let Some(name) = self.column_name_for_index(index) {
                row.insert(name, self.value_for_column_index(index));
            }
        }
        row
    }

    pub fn column_is_null_by_name(&self, name: &str) -> bool {
        self.column_index_for_name(name)
            .map_or(true, |i| self.column_is_null(i))
    }

    pub fn int_for_column(&self, name: &str) -> i32 {
        self.column_index_for_name(name)
            .map_or(0, |i| self.int_for_column_index(i))
    }

    pub fn long_for_column(&self, name: &str) -> i64 {
        self.column_index_for_name(name)
            .map_or(0, |i| self.long_for_column_index(i))
    }

    pub fn double_for_column(&self, name: &str) -> f64 {
        self.column_index_for_name(name)
            .map_or(0.0, |i| self.double_for_column_index(i))
    }

    pub fn bool_for_column(&self, name: &str) -> bool {
        self.column_index_for_name(name)
            .is_some_and(|i| self.bool_for_column_index(i))
    }

    pub fn string_for_column(&self, name: &str) -> Option<String> {
        self.column_index_for_name(name)
            .and_then(|i| self.string_for_column_index(i))
    }

    pub fn data_for_column(&self, name: &str) -> Option<Vec<u8>> {
        self.column_index_for_name(name)
            .and_then(|i| self.data_for_column_index(i))
    }

    pub fn timestamp_for_column(&self, name: &str) -> Option<Timestamp> {
        self.column_index_for_name(name)
            .and_then(|i| self.timestamp_for_column_index(i))
    }

    pub fn value_for_column(&self, name: &str) -> Value {
        self.column_index_for_name(name)
            .map(|i| self.value_for_column_index(i))
            .unwrap_or_default()
    }
}

impl fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("has_row", &self.has_row)
            .finish()
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        self.close();
    }
}
