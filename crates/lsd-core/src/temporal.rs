//! # Temporal Types
//!
//! All timestamps in the license status stack are UTC with second-level
//! precision. Events are recorded at second resolution, rights end dates
//! pushed to the issuing server are truncated the same way, and status
//! documents render them with a `Z` suffix (e.g. `2024-01-01T00:00:00Z`).

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Timelike, Utc};

use crate::error::ValidationError;

/// Drop sub-second precision from a UTC timestamp.
pub fn truncate_to_second(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Render a timestamp as RFC 3339 with `Z` suffix and second precision.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    truncate_to_second(*dt).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp (any offset) into second-precision UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| truncate_to_second(dt.with_timezone(&Utc)))
        .map_err(|e| ValidationError::InvalidTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Source of the current time.
///
/// The API layer holds an `Arc<dyn Clock>` so that expiry and renewal
/// windows can be exercised deterministically in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current UTC time, truncated to the second.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_to_second(Utc::now())
    }
}

/// A settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    epoch_secs: AtomicI64,
}

impl FixedClock {
    /// Create a clock frozen at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            epoch_secs: AtomicI64::new(at.timestamp()),
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.epoch_secs.store(at.timestamp(), Ordering::SeqCst);
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        self.epoch_secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.epoch_secs.load(Ordering::SeqCst);
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn format_uses_z_suffix_and_seconds() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(format_timestamp(&dt), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn parse_normalizes_offsets_to_utc() {
        let dt = parse_timestamp("2023-12-15T02:00:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 12, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = parse_timestamp("next tuesday").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTimestamp { .. }));
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::days(1));
        assert_eq!(clock.now(), start + chrono::Duration::days(1));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    proptest! {
        #[test]
        fn format_then_parse_is_stable(secs in 0i64..4_102_444_800) {
            let dt = Utc.timestamp_opt(secs, 0).unwrap();
            prop_assert_eq!(parse_timestamp(&format_timestamp(&dt)).unwrap(), dt);
        }
    }
}
