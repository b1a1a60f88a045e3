//! Session configuration
//!
//! Diagnostic flags, statement caching, busy-retry policy and the timestamp
//! binding mode, assembled with builder methods.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default ceiling for busy/locked retries (2 seconds)
pub const DEFAULT_MAX_BUSY_RETRY: Duration = Duration::from_secs(2);

/// How timestamp values are written to and read from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampBinding {
    /// Formatted text in the fixed timestamp pattern
    #[default]
    Text,
    /// Floating-point seconds since the Unix epoch
    UnixSeconds,
}

/// Configuration for a [`Session`](crate::backends::Session)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Log engine errors
    pub logs_errors: bool,
    /// Abort the process on usage and engine errors
    pub crash_on_errors: bool,
    /// Log every statement before it runs
    pub trace_execution: bool,
    /// Keep prepared statements for reuse, keyed by SQL text
    pub cache_statements: bool,
    /// How long to keep retrying a busy database; zero disables retries
    pub max_busy_retry: Duration,
    /// Timestamp binding mode
    pub timestamp_binding: TimestampBinding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            logs_errors: true,
            crash_on_errors: false,
            trace_execution: false,
            cache_statements: false,
            max_busy_retry: DEFAULT_MAX_BUSY_RETRY,
            timestamp_binding: TimestampBinding::Text,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable error logging
    pub fn with_logs_errors(mut self, value: bool) -> Self {
        self.logs_errors = value;
        self
    }

    /// Enable or disable aborting on errors
    pub fn with_crash_on_errors(mut self, value: bool) -> Self {
        self.crash_on_errors = value;
        self
    }

    /// Enable or disable statement tracing
    pub fn with_trace_execution(mut self, value: bool) -> Self {
        self.trace_execution = value;
        self
    }

    /// Enable or disable the statement cache
    pub fn with_cache_statements(mut self, value: bool) -> Self {
        self.cache_statements = value;
        self
    }

    /// Set the busy-retry ceiling
    pub fn with_max_busy_retry(mut self, timeout: Duration) -> Self {
        self.max_busy_retry = timeout;
        self
    }

    /// Set the timestamp binding mode
    pub fn with_timestamp_binding(mut self, binding: TimestampBinding) -> Self {
        self.timestamp_binding = binding;
        self
    }
}
