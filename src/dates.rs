//! Date ranges for calendar queries.

use crate::error::ConfigError;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use std::fmt;

/// Inclusive time window passed to the calendar API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

impl DateRange {
    /// From the first day of the month `months - 1` months back through the
    /// last second of the current month.
    pub fn last_months(now: DateTime<Utc>, months: u32) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid(format!("cannot compute a {}-month range", months));

        let this_month = now.date_naive().with_day(1).ok_or_else(invalid)?;
        let first = this_month
            .checked_sub_months(Months::new(months.max(1) - 1))
            .ok_or_else(invalid)?;
        let next_month = this_month
            .checked_add_months(Months::new(1))
            .ok_or_else(invalid)?;

        Ok(Self {
            start: first.and_time(NaiveTime::MIN).and_utc(),
            end: next_month.and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1),
        })
    }

    /// From midnight `days` days ago through the end of today. No future events.
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Result<Self, ConfigError> {
        let today = now.date_naive();
        let first = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| ConfigError::Invalid(format!("cannot go back {} days", days)))?;

        Ok(Self {
            start: first.and_time(NaiveTime::MIN).and_utc(),
            end: end_of_day(today),
        })
    }
}

fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::microseconds(1)
}

/// Render a duration the way spreadsheets expect, e.g. `1:30:00`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{}{}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
