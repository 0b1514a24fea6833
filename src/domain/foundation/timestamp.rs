//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC, millisecond precision on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Seconds elapsed from `earlier` to `self`, never negative.
    ///
    /// A clock that steps backwards yields zero rather than a negative refill.
    pub fn secs_since(&self, earlier: &Timestamp) -> f64 {
        let millis = self.duration_since(earlier).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }

    /// Creates a timestamp from Unix seconds.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self::from_unix_millis(i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000))
    }

    /// Creates a timestamp from Unix milliseconds.
    ///
    /// Out-of-range values collapse to the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> u64 {
        self.0.timestamp().max(0) as u64
    }

    /// Returns the timestamp as Unix milliseconds.
    pub fn as_unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    ///
    /// Saturates at the latest representable instant, as do all `plus_*`.
    pub fn plus_secs(&self, secs: u64) -> Self {
        self.plus(Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Creates a new timestamp by adding a fractional number of seconds.
    pub fn plus_secs_f64(&self, secs: f64) -> Self {
        self.plus(Duration::try_milliseconds((secs * 1000.0).round() as i64))
    }

    /// Creates a new timestamp by subtracting the specified number of seconds.
    pub fn minus_secs(&self, secs: u64) -> Self {
        self.minus(Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Creates a new timestamp by adding the specified number of hours.
    pub fn plus_hours(&self, hours: u32) -> Self {
        self.plus(Duration::try_hours(i64::from(hours)))
    }

    /// Creates a new timestamp by subtracting the specified number of hours.
    pub fn minus_hours(&self, hours: u32) -> Self {
        self.minus(Duration::try_hours(i64::from(hours)))
    }

    fn plus(&self, delta: Option<Duration>) -> Self {
        Self(
            delta
                .and_then(|d| self.0.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    fn minus(&self, delta: Option<Duration>) -> Self {
        Self(
            delta
                .and_then(|d| self.0.checked_sub_signed(d))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    /// Minute bucket label used for per-minute counters (`2024-01-15-10:30`).
    pub fn minute_stamp(&self) -> String {
        self.0.format("%Y-%m-%d-%H:%M").to_string()
    }

    /// Day bucket label used for daily ledgers (`2024-01-15`).
    pub fn day_stamp(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Seconds remaining until the next UTC midnight.
    pub fn secs_until_end_of_day(&self) -> u64 {
        let next_midnight = (self.0.date_naive() + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc());
        match next_midnight {
            Some(end) => end.signed_duration_since(self.0).num_seconds().max(1) as u64,
            None => 86_400,
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
