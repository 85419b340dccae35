//! # Temporal Types — Offset-Aware Event Timestamps
//!
//! The authority requires every timestamp to carry an explicit UTC offset,
//! formatted as `YYYY-MM-DDTHH:MM:SS±HH:MM`, with no sub-seconds and no `Z`
//! shorthand. [`EventTimestamp`] enforces that rendering.
//!
//! Comparisons between timestamps are on the instant, not the wall clock, so
//! a deadline computed in one offset is honoured in any other.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Offset used when the issuer does not configure one (Brasília time).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

/// Build a [`FixedOffset`] from minutes east of UTC.
///
/// # Errors
///
/// [`ValidationError::InvalidTimestamp`] if the offset is beyond ±24h.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ValidationError> {
    FixedOffset::east_opt(minutes * 60).ok_or_else(|| ValidationError::InvalidTimestamp {
        input: minutes.to_string(),
        reason: "UTC offset out of range".into(),
    })
}

/// A seconds-precision timestamp with an explicit UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventTimestamp(DateTime<FixedOffset>);

impl EventTimestamp {
    /// Current time in the given offset, truncated to seconds.
    pub fn now_in(offset: FixedOffset) -> Self {
        Self::from_datetime(Utc::now(), offset)
    }

    /// Convert any zoned datetime into `offset`, truncating sub-seconds.
    pub fn from_datetime<Tz: TimeZone>(dt: DateTime<Tz>, offset: FixedOffset) -> Self {
        let local = dt.with_timezone(&offset);
        Self(local.with_nanosecond(0).unwrap_or(local))
    }

    /// Parse an RFC 3339 timestamp, keeping its offset.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidTimestamp`] if the input is not RFC 3339.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let dt = DateTime::parse_from_rfc3339(s.trim()).map_err(|e| {
            ValidationError::InvalidTimestamp {
                input: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self(dt.with_nanosecond(0).unwrap_or(dt)))
    }

    /// Access the inner datetime.
    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }

    /// The same instant in UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    /// The offset this timestamp renders with.
    pub fn offset(&self) -> FixedOffset {
        *self.0.offset()
    }

    /// This instant shifted by `duration`, in the same offset.
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }

    /// Render in the authority's format, e.g. `2024-10-03T14:05:09-03:00`.
    pub fn to_authority_string(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }
}

impl std::fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_authority_string())
    }
}
