//! Calendar date sequencing
//!
//! The provider publishes one archive per completed UTC day, starting at
//! [`epoch`]. [`DateSequencer`] walks forward from the epoch one day at a time
//! and reports a date as ready only once that day is entirely in the past
//! according to an injectable [`Clock`].

use chrono::{DateTime, Days, NaiveDate, Utc};
use std::sync::Mutex;

/// First day the provider has data for (2003-10-01)
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2003, 10, 1).expect("2003-10-01 is a valid calendar date")
}

/// Source of the current date/time
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant (tests, replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC of the given date
    pub fn at_date(date: NaiveDate) -> Self {
        Self(
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is a valid time of day")
                .and_utc(),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Forward-only cursor over calendar dates starting at [`epoch`]
#[derive(Debug)]
pub struct DateSequencer {
    cursor: Mutex<NaiveDate>,
}

impl Default for DateSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateSequencer {
    /// Create a sequencer positioned at the epoch
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(epoch()),
        }
    }

    /// Return the current cursor date and advance by exactly one day
    pub fn next_date(&self) -> NaiveDate {
        let mut cursor = self.lock();
        let current = *cursor;
        // NaiveDate::MAX is ~262,000 years away; saturate rather than wrap
        *cursor = current.checked_add_days(Days::new(1)).unwrap_or(current);
        current
    }

    /// Whether the cursor date lies strictly before `now`'s calendar date
    ///
    /// Time of day is ignored: at any moment on 2003-10-01 the cursor
    /// 2003-10-01 is not ready, from 2003-10-02T00:00 onwards it is.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        *self.lock() < now.date_naive()
    }

    /// Drain every ready date, in order
    pub fn ready_dates(&self, now: DateTime<Utc>) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        while self.is_ready(now) {
            dates.push(self.next_date());
        }
        dates
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDate> {
        // The guarded value is a plain date; a poisoned lock still holds a valid one
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}
