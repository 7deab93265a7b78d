//! Sources of "now" for stamping records.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::error::{LabError, LabResult};

/// Tells the lab what time it is.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Runs in real time from a user-chosen start.
///
/// Lets a session be replayed "as if" it happened at a given date, e.g. when transcribing times
/// written down on paper.
#[derive(Debug, Clone)]
pub struct OffsetClock {
    start: DateTime<Utc>,
    anchored_at: std::time::Instant,
}

impl OffsetClock {
    /// `millis` replaces the millisecond part of `start` and must be in `0..=999`.
    pub fn new(start: DateTime<Utc>, millis: u32) -> LabResult<Self> {
        if millis >= 1000 {
            return Err(LabError::InvalidParameter(format!(
                "milliseconds must be between 0 and 999, got {millis}"
            )));
        }
        let start = start
            .with_nanosecond(millis * 1_000_000)
            .ok_or_else(|| LabError::InvalidParameter("invalid start time".to_string()))?;

        Ok(Self {
            start,
            anchored_at: std::time::Instant::now(),
        })
    }

    /// The configured start.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }
}

impl Clock for OffsetClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.anchored_at.elapsed()).unwrap_or(Duration::zero());
        self.start + elapsed
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        let mut now = self.now.lock().expect("should not panic while holding lock");
        *now += Duration::milliseconds(ms);
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("should not panic while holding lock") = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("should not panic while holding lock")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn offset_clock_rejects_out_of_range_millis() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert!(OffsetClock::new(start, 1000).is_err());
    }

    #[test]
    fn offset_clock_starts_at_configured_time() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = OffsetClock::new(start, 250).unwrap();

        assert_eq!(clock.start().timestamp_subsec_millis(), 250);
        let now = clock.now();
        assert!(now >= clock.start());
        assert!(now - clock.start() < Duration::seconds(5));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let other = clock.clone();

        clock.advance_ms(1500);

        assert_eq!(other.now() - start, Duration::milliseconds(1500));
    }
}
