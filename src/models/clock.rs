//! Time helpers: millisecond truncation, UTC offsets and local calendar days.
//!
//! Instants are persisted as Unix milliseconds, so every instant that enters
//! the store goes through [`truncate_millis`] first.

use crate::error::{PracticeError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

pub fn truncate_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(time.timestamp_millis()).unwrap_or(time)
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Parses a UTC offset written as `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    let invalid = || PracticeError::InvalidTimezone(value.to_string());
    if value == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Calendar date of `now` as seen in `offset`.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// UTC instant at which the local day `date` starts.
pub fn start_of_local_day(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let utc = local_midnight - TimeDelta::seconds(offset.local_minus_utc().into());
    Utc.from_utc_datetime(&utc)
}

/// Half-open `[start, end)` UTC range of the local calendar day containing `now`.
pub fn local_day_range(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_local_day(local_date(now, offset), offset);
    (start, start + TimeDelta::days(1))
}
