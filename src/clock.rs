//! Calendar sources for the daily scheduler.
//!
//! The scheduler compares calendar dates, never elapsed durations, so all it
//! needs from a clock is "what day is it". [`SystemClock`] answers from the
//! wall clock in local time, [`ManualClock`] answers whatever it was last set
//! to and is meant for simulations and tests.

use chrono::{Offset, TimeZone};
use std::sync::{Arc, Mutex, PoisonError};
use time::{Date, OffsetDateTime, UtcOffset};

/// Current wall-clock time in the local offset.
///
/// The offset is looked up for every call, so a daylight-saving switch in a
/// long-running process moves the date and the stamps with it.
pub fn local_now() -> OffsetDateTime {
    at_local_offset(&chrono::Local::now())
}

/// The instant `now`, expressed in the offset `now` carries.
fn at_local_offset<Tz: TimeZone>(now: &chrono::DateTime<Tz>) -> OffsetDateTime {
    let offset = UtcOffset::from_whole_seconds(now.offset().fix().local_minus_utc())
        .unwrap_or(UtcOffset::UTC);
    now.timestamp_nanos_opt()
        .and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
        .to_offset(offset)
}

/// Source of the current calendar date.
pub trait Clock: Send + Sync {
    /// Today's date.
    fn today(&self) -> Date;
}

/// Wall clock in local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Date {
        local_now().date()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same date, so a test can keep one handle and give the
/// other to the scheduler.
#[derive(Debug, Clone)]
pub struct ManualClock {
    date: Arc<Mutex<Date>>,
}

impl ManualClock {
    /// Create a clock frozen at `date`.
    pub fn new(date: Date) -> Self {
        Self {
            date: Arc::new(Mutex::new(date)),
        }
    }

    /// Jump to `date`.
    pub fn set(&self, date: Date) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    /// Move forward by `days` calendar days.
    pub fn advance_days(&self, days: i64) {
        let mut guard = self.date.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = guard.saturating_add(time::Duration::days(days));
    }
}

impl Clock for ManualClock {
    fn today(&self) -> Date {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
