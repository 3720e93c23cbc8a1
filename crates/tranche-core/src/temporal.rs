//! # Temporal Types: UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only, seconds-precision instant. Sale periods
//! are whole seconds, and every phase boundary compares `Timestamp`s.
//!
//! ## Boundary Rule
//!
//! A period is over once `now` strictly exceeds its end; at exact equality
//! the period is still running. Helpers here never encode that rule
//! themselves, callers compare with `>` explicitly.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC-only timestamp, truncated to seconds precision.
///
/// # Construction
///
/// - [`Timestamp::now()`]: current UTC time, truncated.
/// - [`Timestamp::from_utc()`]: from a `DateTime<Utc>`, truncating sub-seconds.
/// - [`Timestamp::parse()`]: from an RFC 3339 string, rejecting non-UTC offsets.
/// - [`Timestamp::from_epoch_secs()`]: from Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp from the current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse a timestamp from an RFC 3339 string.
    ///
    /// Only the `Z` suffix is accepted; explicit offsets, even `+00:00`, are
    /// rejected so the canonical form of a timestamp is unique.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::Malformed {
                field: "timestamp",
                reason: format!("must use Z suffix (UTC only), got {s:?}"),
            });
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| ValidationError::Malformed {
            field: "timestamp",
            reason: format!("invalid RFC 3339 timestamp {s:?}: {e}"),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Create a timestamp from Unix epoch seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| ValidationError::Malformed {
                field: "timestamp",
                reason: format!("invalid Unix timestamp: {secs}"),
            })
    }

    /// Returns the Unix epoch timestamp in seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant shifted forward by `secs` seconds.
    pub fn checked_add_secs(&self, secs: u64) -> Option<Self> {
        let secs = i64::try_from(secs).ok()?;
        let shifted = self.0.timestamp().checked_add(secs)?;
        DateTime::from_timestamp(shifted, 0).map(Self)
    }

    /// Whole seconds from `earlier` to `self`, saturating at zero.
    pub fn secs_since(&self, earlier: &Timestamp) -> u64 {
        u64::try_from(self.epoch_secs() - earlier.epoch_secs()).unwrap_or(0)
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Truncate a `DateTime<Utc>` to seconds precision (discard nanoseconds).
fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}
