//! Wall-clock timestamps for save documents.
//!
//! Documents carry their history as ISO-8601 strings. Every comparison the
//! sync engine makes goes through [`Timestamp`], so a malformed value is
//! rejected at parse time instead of silently comparing as `NaN`.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use std::time::Duration;

/// A UTC instant with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Parses an RFC 3339 string (`2024-03-01T10:00:00.000Z`).
    ///
    /// Offsets other than `Z` are accepted and normalized to UTC.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidTimestamp("empty timestamp".to_string()));
        }
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|e| Error::InvalidTimestamp(format!("{trimmed:?}: {e}")))
    }

    /// Creates a timestamp from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Result<Self> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Self)
            .ok_or_else(|| Error::InvalidTimestamp(format!("{millis} ms is out of range")))
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// `self + duration`, or `None` past the representable range.
    /// Sub-millisecond parts of `duration` are dropped.
    #[must_use]
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        self.0.checked_add_signed(whole_millis(duration)?).map(Self)
    }

    /// `self - duration`, or `None` before the representable range.
    #[must_use]
    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        self.0.checked_sub_signed(whole_millis(duration)?).map(Self)
    }

    /// Absolute distance between two timestamps.
    #[must_use]
    pub fn abs_diff(&self, other: &Self) -> Duration {
        Duration::from_millis(self.as_millis().abs_diff(other.as_millis()))
    }

    /// Formats as RFC 3339 with millisecond precision and a `Z` suffix.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn from_datetime(dt: DateTime<Utc>) -> Self {
        // Truncate to millis so a value survives a string round-trip unchanged.
        let millis = dt.timestamp_millis();
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or(dt))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    /// Saturates at the latest representable instant.
    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs)
            .unwrap_or_else(|| Self::from_datetime(DateTime::<Utc>::MAX_UTC))
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    /// Saturates at the earliest representable instant.
    fn sub(self, rhs: Duration) -> Self::Output {
        self.checked_sub(rhs)
            .unwrap_or_else(|| Self::from_datetime(DateTime::<Utc>::MIN_UTC))
    }
}

/// Whole milliseconds of `duration` as a chrono delta, if representable.
fn whole_millis(duration: Duration) -> Option<chrono::Duration> {
    let millis = u64::try_from(duration.as_millis()).ok()?;
    chrono::Duration::from_std(Duration::from_millis(millis)).ok()
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
