//! Calendar bucket arithmetic. All boundaries are UTC.

use chrono::{DateTime, Datelike, Days, Months, NaiveTime, TimeDelta, Timelike, Utc};
use serde::Serialize;

use crate::models::Granularity;

/// A half-open `[start, end)` aggregation interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Bucket {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Midnight on the first day of the month containing `ts`
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let date = ts.date_naive() - Days::new(u64::from(ts.day0()));
    date.and_time(NaiveTime::MIN).and_utc()
}

impl Granularity {
    /// Start of the bucket containing `ts`
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        match self {
            Granularity::Hourly => midnight + TimeDelta::hours(i64::from(ts.hour())),
            Granularity::Daily => midnight,
            // ISO weeks start on Monday
            Granularity::Weekly => {
                midnight - TimeDelta::days(i64::from(ts.weekday().num_days_from_monday()))
            }
            Granularity::Monthly => month_start(ts),
        }
    }

    /// Start of the bucket following the one that starts at `start`
    pub fn next_bucket_start(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Hourly => start + TimeDelta::hours(1),
            Granularity::Daily => start + TimeDelta::days(1),
            Granularity::Weekly => start + TimeDelta::weeks(1),
            Granularity::Monthly => start + Months::new(1),
        }
    }

    /// Start of the bucket preceding the one containing `ts`
    pub fn previous_bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let current = self.bucket_start(ts);
        match self {
            Granularity::Monthly => current - Months::new(1),
            _ => self.bucket_start(current - TimeDelta::nanoseconds(1)),
        }
    }

    /// The bucket containing `ts`
    pub fn bucket_of(&self, ts: DateTime<Utc>) -> Bucket {
        let start = self.bucket_start(ts);
        Bucket {
            start,
            end: self.next_bucket_start(start),
        }
    }
}

/// Every bucket that intersects `[window_start, window_end)`, in order.
///
/// Buckets are whole: an unaligned `window_start` is floored to the start
/// of its bucket, and the last bucket may extend past `window_end`.
pub fn partition(
    granularity: Granularity,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut start = granularity.bucket_start(window_start);

    while start < window_end {
        let end = granularity.next_bucket_start(start);
        buckets.push(Bucket { start, end });
        start = end;
    }

    buckets
}
