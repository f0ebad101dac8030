// crates/expense-gate-core/src/core/time.rs
// ============================================================================
// Module: Expense Gate Time
// Description: Unix-second timestamps and injectable clocks.
// Purpose: Keep every time-dependent decision driven by an explicit clock.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Components never read the wall clock directly. They receive a [`Clock`]
//! so token validity windows, webhook replay tolerance, and monthly quota
//! periods can be tested against fixed instants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Instant expressed as whole seconds since the unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns unix seconds.
    #[must_use]
    pub const fn as_unix_secs(self) -> i64 {
        self.0
    }

    /// Returns a timestamp shifted forward by `secs` (saturating).
    #[must_use]
    pub const fn plus_secs(self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Returns a timestamp shifted backward by `secs` (saturating).
    #[must_use]
    pub const fn minus_secs(self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// Returns `self - earlier` in seconds (saturating).
    #[must_use]
    pub const fn seconds_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Parses an RFC 3339 timestamp, truncating sub-second precision.
    #[must_use]
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        OffsetDateTime::parse(value.trim(), &Rfc3339).ok().map(|dt| Self(dt.unix_timestamp()))
    }

    /// Returns the UTC calendar month (`YYYY-MM`) containing this instant.
    #[must_use]
    pub fn calendar_month(self) -> Option<String> {
        let dt = OffsetDateTime::from_unix_timestamp(self.0).ok()?;
        Some(format!("{:04}-{:02}", dt.year(), u8::from(dt.month())))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(OffsetDateTime::now_utc().unix_timestamp())
    }
}

/// Manually driven clock for tests and deterministic tooling.
#[derive(Debug)]
pub struct ManualClock {
    /// Current unix seconds.
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock fixed at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start.0),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.now.store(at.0, Ordering::SeqCst);
    }

    /// Advances the clock by `secs` (negative values move it back).
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn calendar_month_is_utc() {
        // 2026-02-28T23:59:59Z
        let ts = Timestamp::from_unix_secs(1_772_323_199);
        assert_eq!(ts.calendar_month().unwrap(), "2026-02");
        assert_eq!(ts.plus_secs(1).calendar_month().unwrap(), "2026-03");
    }

    #[test]
    fn parses_rfc3339_with_fraction() {
        let ts = Timestamp::parse_rfc3339("2026-03-01T00:00:00.250Z").unwrap();
        assert_eq!(ts.as_unix_secs(), 1_772_323_200);
        assert!(Timestamp::parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn manual_clock_moves() {
        let clock = ManualClock::new(Timestamp::from_unix_secs(100));
        clock.advance(50);
        assert_eq!(clock.now().as_unix_secs(), 150);
        clock.set(Timestamp::from_unix_secs(10));
        assert_eq!(clock.now().as_unix_secs(), 10);
    }
}
