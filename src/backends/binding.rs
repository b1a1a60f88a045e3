//! Value to engine parameter binding

use super::engine::{error_string, RawStatement};
use crate::core::{DatabaseError, Result, TimestampBinding, Value};
use rusqlite::ffi;
use std::ffi::c_int;

/// Bind `value` to the 1-based placeholder `index`
///
/// Lists and maps have no engine representation and are refused.
pub(crate) fn bind_value(
    statement: &RawStatement,
    index: usize,
    value: &Value,
    timestamps: TimestampBinding,
) -> Result<()> {
    let index = c_int::try_from(index)
        .map_err(|_| DatabaseError::engine(ffi::SQLITE_RANGE, "parameter index out of range"))?;

    let rc = match value {
        Value::None => statement.bind_null(index),
        Value::Blob(bytes) => statement.bind_blob(index, bytes),
        Value::Timestamp(ts) => match timestamps {
            TimestampBinding::Text => statement.bind_text(index, &ts.format()),
            TimestampBinding::UnixSeconds => statement.bind_double(index, ts.unix_seconds()),
        },
        Value::String(s) => statement.bind_text(index, s),
        Value::Bool(b) => statement.bind_int(index, i32::from(*b)),
        Value::Char(c) => statement.bind_int(index, i32::from(*c)),
        Value::Byte(b) => statement.bind_int(index, i32::from(*b)),
        Value::Int(i) => statement.bind_int(index, *i),
        // u32 does not fit the engine's 32-bit slot
        Value::UInt(u) => statement.bind_int64(index, i64::from(*u)),
        Value::Int64(i) => statement.bind_int64(index, *i),
        // values above i64::MAX keep their bit pattern
        Value::UInt64(u) => statement.bind_int64(index, *u as i64),
        Value::Float(f) => statement.bind_double(index, f64::from(*f)),
        Value::Double(d) => statement.bind_double(index, *d),
        Value::List(_) | Value::StringMap(_) | Value::IntMap(_) => {
            return Err(DatabaseError::UnsupportedBinding(value.kind()));
        }
    };

    if rc != ffi::SQLITE_OK {
        return Err(DatabaseError::engine(rc, error_string(rc)));
    }
    Ok(())
}
