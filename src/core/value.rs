//! Dynamic value type
//!
//! [`Value`] is a tagged union used to marshal application data into statement
//! parameters and out of result columns. Kinds are ordered: everything below
//! [`ValueKind::String`] is an inline scalar, everything at or above it owns
//! heap data. Cloning deep-copies heap payloads; `std::mem::take` moves a
//! value out and leaves [`Value::None`] behind.

use super::error::{DatabaseError, Result};
use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ordered list of values
pub type ValueList = Vec<Value>;

/// String-keyed map of values
pub type ValueMap = HashMap<String, Value>;

/// Integer-keyed map of values
pub type ValueIntMap = HashMap<i32, Value>;

const FLOAT_EPSILON: f32 = f32::EPSILON;
const DOUBLE_EPSILON: f64 = f64::EPSILON;

/// Discriminant of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueKind {
    None = 0,
    Bool,
    Char,
    Byte,
    Int,
    UInt,
    Float,
    Double,
    Int64,
    UInt64,
    String,
    Blob,
    Timestamp,
    List,
    StringMap,
    IntMap,
}

impl ValueKind {
    /// Kind name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Char => "char",
            ValueKind::Byte => "byte",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Int64 => "int64",
            ValueKind::UInt64 => "uint64",
            ValueKind::String => "string",
            ValueKind::Blob => "blob",
            ValueKind::Timestamp => "timestamp",
            ValueKind::List => "list",
            ValueKind::StringMap => "string map",
            ValueKind::IntMap => "int map",
        }
    }

    /// Plain numeric or boolean kind stored inline
    pub fn is_scalar(&self) -> bool {
        *self > ValueKind::None && *self < ValueKind::String
    }

    /// Kind that owns heap data
    pub fn is_heap(&self) -> bool {
        *self >= ValueKind::String
    }

    /// Kind that never converts to anything but itself
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            ValueKind::Blob | ValueKind::List | ValueKind::StringMap | ValueKind::IntMap
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value that can hold one of sixteen kinds of data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    #[default]
    None,
    /// Boolean value
    Bool(bool),
    /// Signed byte-width character code
    Char(i8),
    /// Unsigned byte
    Byte(u8),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit unsigned integer
    UInt(u32),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit unsigned integer
    UInt64(u64),
    /// UTF-8 string
    String(String),
    /// Binary data
    Blob(Vec<u8>),
    /// Point in time
    Timestamp(Timestamp),
    /// Ordered list of values
    List(ValueList),
    /// String-keyed map of values
    StringMap(ValueMap),
    /// Integer-keyed map of values
    IntMap(ValueIntMap),
}

/// Numeric view of a scalar used for cross-kind conversion
#[derive(Clone, Copy)]
enum Number {
    Signed(i64),
    Unsigned(u64),
    Real(f64),
}

impl Number {
    fn as_i64(self) -> i64 {
        match self {
            Number::Signed(v) => v,
            Number::Unsigned(v) => v as i64,
            Number::Real(v) => v as i64,
        }
    }

    fn as_u64(self) -> u64 {
        match self {
            Number::Signed(v) => v as u64,
            Number::Unsigned(v) => v,
            Number::Real(v) => v as u64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Signed(v) => v as f64,
            Number::Unsigned(v) => v as f64,
            Number::Real(v) => v,
        }
    }

    fn is_nonzero(self) -> bool {
        match self {
            Number::Signed(v) => v != 0,
            Number::Unsigned(v) => v != 0,
            Number::Real(v) => v != 0.0,
        }
    }
}

/// Parse the leading numeric part of `text`, yielding zero when there is none
fn parse_number(text: &str) -> Number {
    let text = text.trim();
    if let Ok(v) = text.parse::<i64>() {
        return Number::Signed(v);
    }
    if let Ok(v) = text.parse::<u64>() {
        return Number::Unsigned(v);
    }
    if let Ok(v) = text.parse::<f64>() {
        return Number::Real(v);
    }

    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return Number::Signed(0);
    }
    let mut real_end = end;
    if real_end < bytes.len() && bytes[real_end] == b'.' {
        real_end += 1;
        while real_end < bytes.len() && bytes[real_end].is_ascii_digit() {
            real_end += 1;
        }
        if let Ok(v) = text[..real_end].parse::<f64>() {
            return Number::Real(v);
        }
    }
    text[..end]
        .parse::<i64>()
        .map(Number::Signed)
        .unwrap_or(Number::Signed(0))
}

impl Value {
    /// The active kind
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::None => ValueKind::None,
            Value::Bool(_) => ValueKind::Bool,
            Value::Char(_) => ValueKind::Char,
            Value::Byte(_) => ValueKind::Byte,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::String(_) => ValueKind::String,
            Value::Blob(_) => ValueKind::Blob,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::List(_) => ValueKind::List,
            Value::StringMap(_) => ValueKind::StringMap,
            Value::IntMap(_) => ValueKind::IntMap,
        }
    }

    /// Check if the value is none
    pub fn is_null(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Whether the value may be read as `target`
    ///
    /// - none converts only to string (`"(null)"`)
    /// - scalars convert freely among themselves and to/from string
    /// - timestamp converts to string, never the other way round
    /// - blob, list and both map kinds convert only to themselves
    pub fn convert(&self, target: ValueKind) -> bool {
        let kind = self.kind();
        if kind == target {
            return true;
        }
        match kind {
            ValueKind::None => target == ValueKind::String,
            ValueKind::Timestamp => target == ValueKind::String,
            ValueKind::String => target.is_scalar(),
            k if k.is_scalar() => target.is_scalar() || target == ValueKind::String,
            _ => false,
        }
    }

    fn check(&self, target: ValueKind) -> Result<()> {
        if self.convert(target) {
            Ok(())
        } else {
            Err(DatabaseError::invalid_conversion(self.kind(), target))
        }
    }

    fn number(&self, target: ValueKind) -> Result<Number> {
        self.check(target)?;
        let number = match self {
            Value::Bool(v) => Number::Signed(i64::from(*v)),
            Value::Char(v) => Number::Signed(i64::from(*v)),
            Value::Byte(v) => Number::Unsigned(u64::from(*v)),
            Value::Int(v) => Number::Signed(i64::from(*v)),
            Value::UInt(v) => Number::Unsigned(u64::from(*v)),
            Value::Float(v) => Number::Real(f64::from(*v)),
            Value::Double(v) => Number::Real(*v),
            Value::Int64(v) => Number::Signed(*v),
            Value::UInt64(v) => Number::Unsigned(*v),
            Value::String(s) => parse_number(s),
            _ => return Err(DatabaseError::invalid_conversion(self.kind(), target)),
        };
        Ok(number)
    }

    /// Read as a boolean
    ///
    /// Strings are true unless they read exactly `"0"` or `"false"`.
    pub fn to_bool(&self) -> Result<bool> {
        self.check(ValueKind::Bool)?;
        match self {
            Value::Bool(v) => Ok(*v),
            Value::String(s) => Ok(!(s == "0" || s == "false")),
            _ => Ok(self.number(ValueKind::Bool)?.is_nonzero()),
        }
    }

    /// Read as a signed character code
    pub fn to_char(&self) -> Result<i8> {
        Ok(self.number(ValueKind::Char)?.as_i64() as i8)
    }

    /// Read as an unsigned byte
    pub fn to_byte(&self) -> Result<u8> {
        Ok(self.number(ValueKind::Byte)?.as_i64() as u8)
    }

    /// Read as a 32-bit signed integer
    pub fn to_int(&self) -> Result<i32> {
        Ok(self.number(ValueKind::Int)?.as_i64() as i32)
    }

    /// Read as a 32-bit unsigned integer
    pub fn to_uint(&self) -> Result<u32> {
        Ok(self.number(ValueKind::UInt)?.as_u64() as u32)
    }

    /// Read as a 32-bit float
    pub fn to_float(&self) -> Result<f32> {
        Ok(self.number(ValueKind::Float)?.as_f64() as f32)
    }

    /// Read as a 64-bit float
    pub fn to_double(&self) -> Result<f64> {
        Ok(self.number(ValueKind::Double)?.as_f64())
    }

    /// Read as a 64-bit signed integer
    pub fn to_int64(&self) -> Result<i64> {
        Ok(self.number(ValueKind::Int64)?.as_i64())
    }

    /// Read as a 64-bit unsigned integer
    pub fn to_uint64(&self) -> Result<u64> {
        Ok(self.number(ValueKind::UInt64)?.as_u64())
    }

    /// Read as text
    ///
    /// None renders as `"(null)"`, timestamps use the fixed textual pattern.
    pub fn to_string_value(&self) -> Result<String> {
        self.check(ValueKind::String)?;
        let text = match self {
            Value::None => "(null)".to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Char(v) => v.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.format(),
            _ => return Err(DatabaseError::invalid_conversion(self.kind(), ValueKind::String)),
        };
        Ok(text)
    }

    /// Borrow the string payload without conversion
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Read as a timestamp
    pub fn to_timestamp(&self) -> Result<Timestamp> {
        match self {
            Value::Timestamp(ts) => Ok(*ts),
            _ => Err(DatabaseError::invalid_conversion(
                self.kind(),
                ValueKind::Timestamp,
            )),
        }
    }

    /// Borrow the blob payload
    pub fn as_blob(&self) -> Result<&[u8]> {
        match self {
            Value::Blob(b) => Ok(b),
            _ => Err(DatabaseError::invalid_conversion(self.kind(), ValueKind::Blob)),
        }
    }

    /// Borrow the list payload
    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(DatabaseError::invalid_conversion(self.kind(), ValueKind::List)),
        }
    }

    /// Borrow the string-keyed map payload
    pub fn as_string_map(&self) -> Result<&ValueMap> {
        match self {
            Value::StringMap(map) => Ok(map),
            _ => Err(DatabaseError::invalid_conversion(
                self.kind(),
                ValueKind::StringMap,
            )),
        }
    }

    /// Borrow the integer-keyed map payload
    pub fn as_int_map(&self) -> Result<&ValueIntMap> {
        match self {
            Value::IntMap(map) => Ok(map),
            _ => Err(DatabaseError::invalid_conversion(self.kind(), ValueKind::IntMap)),
        }
    }

    /// Mutably borrow the list payload
    pub fn as_list_mut(&mut self) -> Result<&mut ValueList> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(DatabaseError::invalid_conversion(other.kind(), ValueKind::List)),
        }
    }

    /// Mutably borrow the string-keyed map payload
    pub fn as_string_map_mut(&mut self) -> Result<&mut ValueMap> {
        match self {
            Value::StringMap(map) => Ok(map),
            other => Err(DatabaseError::invalid_conversion(
                other.kind(),
                ValueKind::StringMap,
            )),
        }
    }

    /// Indented, human-readable rendering
    ///
    /// Map entries are listed in key order so the output is stable.
    pub fn description(&self) -> String {
        let mut out = String::new();
        self.write_description(&mut out, 0);
        out
    }

    fn write_description(&self, out: &mut String, depth: usize) {
        let pad = |out: &mut String, depth: usize| {
            for _ in 0..depth {
                out.push('\t');
            }
        };

        match self {
            Value::String(s) => out.push_str(s),
            Value::Blob(b) => {
                out.push('<');
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 && i % 4 == 0 {
                        out.push(' ');
                    }
                    out.push_str(&format!("{byte:02x}"));
                }
                out.push('>');
            }
            Value::List(items) => {
                out.push_str("[\n");
                for (i, item) in items.iter().enumerate() {
                    pad(out, depth + 1);
                    out.push_str(&format!("{i}: "));
                    item.write_description(out, depth + 1);
                    out.push('\n');
                }
                pad(out, depth);
                out.push(']');
            }
            Value::StringMap(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push_str("{\n");
                for key in keys {
                    pad(out, depth + 1);
                    out.push_str(key);
                    out.push_str(": ");
                    map[key].write_description(out, depth + 1);
                    out.push('\n');
                }
                pad(out, depth);
                out.push('}');
            }
            Value::IntMap(map) => {
                let mut keys: Vec<&i32> = map.keys().collect();
                keys.sort();
                out.push_str("{\n");
                for key in keys {
                    pad(out, depth + 1);
                    out.push_str(&format!("{key}: "));
                    map[key].write_description(out, depth + 1);
                    out.push('\n');
                }
                pad(out, depth);
                out.push('}');
            }
            scalar => {
                if let Ok(text) = scalar.to_string_value() {
                    out.push_str(&text);
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a - b).abs() <= FLOAT_EPSILON,
            (Value::Double(a), Value::Double(b)) => a == b || (a - b).abs() <= DOUBLE_EPSILON,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::UInt64(a), Value::UInt64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::StringMap(a), Value::StringMap(b)) => a == b,
            (Value::IntMap(a), Value::IntMap(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Char(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<ValueList> for Value {
    fn from(v: ValueList) -> Self {
        Value::List(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::StringMap(v)
    }
}

impl From<ValueIntMap> for Value {
    fn from(v: ValueIntMap) -> Self {
        Value::IntMap(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::None,
        }
    }
}
