//! Core session-layer types
//!
//! This module provides the engine-independent building blocks: error types,
//! the dynamic value type, timestamps and session configuration.

pub mod config;
pub mod error;
pub mod timestamp;
pub mod value;

// Re-export commonly used types
pub use config::{SessionConfig, TimestampBinding, DEFAULT_MAX_BUSY_RETRY};
pub use error::{DatabaseError, Result};
pub use timestamp::{Timestamp, REFERENCE_EPOCH_OFFSET, TIMESTAMP_FORMAT};
pub use value::{Value, ValueIntMap, ValueKind, ValueList, ValueMap};
