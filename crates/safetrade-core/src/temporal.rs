//! # Temporal Types: UTC-Only Timestamps
//!
//! Milestones, invoice due dates, audit records and notification events all
//! carry a [`Timestamp`]: UTC, whole seconds. The audit chain hashes the
//! rendered form, so one instant must always render as the same
//! `YYYY-MM-DDTHH:MM:SSZ` string.
//!
//! [`Timestamp::parse()`] accepts only the `Z` form. Offsets, even
//! `+00:00`, are a validation failure.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

const RENDER_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }

    /// Parse an RFC 3339 `Z` timestamp, dropping sub-seconds.
    pub fn parse(s: &str) -> Result<Self, LifecycleError> {
        if !s.ends_with('Z') {
            return Err(LifecycleError::validation(
                "timestamp",
                format!("{s:?} is not a UTC timestamp ending in Z"),
            ));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::from_utc(dt.with_timezone(&Utc)))
            .map_err(|e| LifecycleError::validation("timestamp", format!("{s:?}: {e}")))
    }

    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Whole days from `earlier` to `self`; negative if `earlier` is later.
    pub fn days_since(&self, earlier: &Timestamp) -> i64 {
        (self.0 - earlier.0).num_days()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// The canonical `YYYY-MM-DDTHH:MM:SSZ` rendering.
    pub fn to_iso8601(&self) -> String {
        self.0.format(RENDER_FORMAT).to_string()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(RENDER_FORMAT))
    }
}
