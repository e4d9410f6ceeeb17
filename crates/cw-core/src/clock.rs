use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::types::TimestampNanos;

/// Wall-clock source in the remote system's unit (nanoseconds since epoch).
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> TimestampNanos;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> TimestampNanos {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

/// Settable clock for tests and the offline demo agent.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: TimestampNanos) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: TimestampNanos) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> TimestampNanos {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

pub fn nanos_to_datetime(ns: TimestampNanos) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(i64::try_from(ns).unwrap_or(i64::MAX))
}

/// `None` for datetimes before the epoch or past what fits in `u64`.
pub fn datetime_to_nanos(dt: DateTime<Utc>) -> Option<TimestampNanos> {
    dt.timestamp_nanos_opt().and_then(|n| u64::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_micros(2));
        assert_eq!(clock.now_nanos(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_nanos(), 10);
    }

    #[test]
    fn datetime_conversion_is_symmetric() {
        let ns = 1_700_000_000_123_456_789;
        let dt = nanos_to_datetime(ns);
        assert_eq!(datetime_to_nanos(dt), Some(ns));
    }

    #[test]
    fn pre_epoch_datetime_has_no_nanos() {
        let dt = DateTime::<Utc>::from_timestamp(-10, 0).expect("valid");
        assert_eq!(datetime_to_nanos(dt), None);
    }
}
