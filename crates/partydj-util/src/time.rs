//! Time utilities for partydj
//!
//! Every policy decision takes "now" as epoch milliseconds. Components that
//! need to read the time hold a [`Clock`] so tests can drive it by hand.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `PARTYDJ_MOCK_TIME` environment variable can be set
//! to shift the system clock for all time-sensitive operations.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

/// Epoch milliseconds, the unit of every timestamp in room state
pub type EpochMillis = i64;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "PARTYDJ_MOCK_TIME";

/// Offset between mock time and real time, computed once at first use
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match parse_mock_time(&mock_time_str) {
                Some(mock_dt) => {
                    let offset = mock_dt.signed_duration_since(Local::now());
                    tracing::info!(
                        mock_time = %mock_time_str,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                None => {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

fn parse_mock_time(s: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).single()
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current local time, respecting mock time in debug builds.
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Current time as epoch milliseconds, respecting mock time.
pub fn now_millis() -> EpochMillis {
    now().timestamp_millis()
}

/// Source of "now" for components that read the time themselves
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> EpochMillis;
}

/// The process clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        now_millis()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EpochMillis) -> Self {
        Self {
            millis: AtomicI64::new(start),
        }
    }

    pub fn set(&self, millis: EpochMillis) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: i64) {
        self.millis.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Milliseconds elapsed from `earlier` to `now`; negative when the clock went backwards
pub fn elapsed_ms(now: EpochMillis, earlier: EpochMillis) -> i64 {
    now.saturating_sub(earlier)
}

/// Convert epoch milliseconds into local time for logs and audit records
pub fn millis_to_local(millis: EpochMillis) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }

    #[test]
    fn system_clock_is_recent() {
        // After 2020-01-01
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn elapsed_saturates() {
        assert_eq!(elapsed_ms(100, 40), 60);
        assert_eq!(elapsed_ms(40, 100), -60);
        assert_eq!(elapsed_ms(i64::MIN, 1), i64::MIN);
    }

    #[test]
    fn parse_mock_time_formats() {
        assert!(parse_mock_time("2025-12-25 14:30:00").is_some());
        assert!(parse_mock_time("2025-12-25T14:30:00").is_none());
        assert!(parse_mock_time("not a date").is_none());
    }

    #[test]
    fn millis_round_trip_through_local() {
        let dt = millis_to_local(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }
}
