//! Point-in-time values
//!
//! A [`Timestamp`] is an immutable instant stored as floating-point seconds
//! since the Unix epoch. It can also be expressed relative to the reference
//! instant 2001-01-01T00:00:00Z, and renders to and parses from a fixed
//! textual pattern in the local time zone.

use super::error::{DatabaseError, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z
pub const REFERENCE_EPOCH_OFFSET: f64 = 978_307_200.0;

/// Textual pattern: weekday, month, day, 4-digit year, 24h time, UTC offset
///
/// Renders as e.g. `Sat Oct 17 2026 14:03:09 +0200`.
pub const TIMESTAMP_FORMAT: &str = "%a %b %d %Y %H:%M:%S %z";

/// An instant with sub-second precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp {
    since_epoch: f64,
}

impl Timestamp {
    /// The current instant
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            since_epoch: now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9,
        }
    }

    /// An instant given as seconds since the Unix epoch
    pub fn from_unix_seconds(seconds: f64) -> Self {
        Self {
            since_epoch: seconds,
        }
    }

    /// An instant given as seconds since 2001-01-01T00:00:00Z
    pub fn from_reference_seconds(seconds: f64) -> Self {
        Self {
            since_epoch: REFERENCE_EPOCH_OFFSET + seconds,
        }
    }

    /// An instant offset from now by `seconds`
    pub fn from_now(seconds: f64) -> Self {
        Self::now().adding_interval(seconds)
    }

    /// The reference instant itself, used as a cleared state
    pub fn cleared() -> Self {
        Self::from_reference_seconds(0.0)
    }

    /// Whether this is the cleared reference instant
    pub fn is_cleared(&self) -> bool {
        self.reference_seconds() == 0.0
    }

    /// Seconds since the Unix epoch
    pub fn unix_seconds(&self) -> f64 {
        self.since_epoch
    }

    /// Seconds since 2001-01-01T00:00:00Z
    pub fn reference_seconds(&self) -> f64 {
        self.since_epoch - REFERENCE_EPOCH_OFFSET
    }

    /// A new instant `seconds` after this one (negative moves backwards)
    pub fn adding_interval(&self, seconds: f64) -> Self {
        Self {
            since_epoch: self.since_epoch + seconds,
        }
    }

    /// Seconds from `other` to this instant; negative if `other` is later
    pub fn interval_since(&self, other: &Timestamp) -> f64 {
        self.since_epoch - other.since_epoch
    }

    /// Seconds from now to this instant; negative for past instants
    pub fn interval_since_now(&self) -> f64 {
        self.interval_since(&Self::now())
    }

    fn to_utc(self) -> Option<DateTime<Utc>> {
        let secs = self.since_epoch.floor();
        let nanos = ((self.since_epoch - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::<Utc>::from_timestamp(secs as i64, nanos)
    }

    /// Render in the local time zone using [`TIMESTAMP_FORMAT`]
    ///
    /// Sub-second precision is dropped by the pattern.
    pub fn format(&self) -> String {
        match self.to_utc() {
            Some(utc) => utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
            None => format!("{}", self.since_epoch),
        }
    }

    /// Parse text produced by [`Timestamp::format`]
    pub fn parse(text: &str) -> Result<Self> {
        let parsed = DateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| DatabaseError::InvalidTimestamp(format!("{text:?}: {e}")))?;
        Ok(Self::from_unix_seconds(parsed.timestamp() as f64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::cleared()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl std::str::FromStr for Timestamp {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_unix_seconds(
            value.timestamp() as f64 + f64::from(value.timestamp_subsec_nanos()) / 1e9,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_epoch() {
        let ts = Timestamp::from_reference_seconds(0.0);
        assert_eq!(ts.unix_seconds(), REFERENCE_EPOCH_OFFSET);
        assert!(ts.is_cleared());
        assert_eq!(Timestamp::default(), ts);

        let ts = Timestamp::from_unix_seconds(REFERENCE_EPOCH_OFFSET + 10.5);
        assert_eq!(ts.reference_seconds(), 10.5);
        assert!(!ts.is_cleared());
    }

    #[test]
    fn test_interval_arithmetic() {
        let start = Timestamp::from_unix_seconds(1_000.0);
        let later = start.adding_interval(2.25);
        assert_eq!(later.interval_since(&start), 2.25);
        assert_eq!(start.interval_since(&later), -2.25);
        assert!(later > start);

        let earlier = start.adding_interval(-1_000.0);
        assert_eq!(earlier.unix_seconds(), 0.0);
    }

    #[test]
    fn test_now_is_recent() {
        let now = Timestamp::now();
        assert!(now.interval_since_now().abs() < 5.0);
        assert!(Timestamp::from_now(60.0).interval_since(&now) >= 59.0);
    }

    #[test]
    fn test_format_round_trip() {
        let ts = Timestamp::from_unix_seconds(1_700_000_000.0);
        let text = ts.format();
        let parsed = Timestamp::parse(&text).unwrap();
        assert_eq!(parsed, ts);
        assert_eq!(parsed.format(), text);
    }

    #[test]
    fn test_format_drops_fraction() {
        let ts = Timestamp::from_unix_seconds(1_700_000_000.75);
        let parsed: Timestamp = ts.format().parse().unwrap();
        assert_eq!(parsed.unix_seconds(), 1_700_000_000.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = Timestamp::parse("yesterday at noon").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidTimestamp(_)));
    }
}
