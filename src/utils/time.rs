use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime};

use crate::models::DAYS_IN_WEEK;

fn local_at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    date.and_time(time).and_local_timezone(Local).earliest()
}

/// Start of `date` in local time. Falls back to 01:00 when midnight does not
/// exist (DST gap).
pub fn local_midnight(date: NaiveDate) -> Option<DateTime<Local>> {
    local_at(date, NaiveTime::from_hms_opt(0, 0, 0)?)
        .or_else(|| local_at(date, NaiveTime::from_hms_opt(1, 0, 0)?))
}

/// Query window for one calendar day: midnight to 23:59:59, or to `now` when
/// `date` is today.
pub fn day_bounds(date: NaiveDate, now: DateTime<Local>) -> (DateTime<Local>, DateTime<Local>) {
    let start = local_midnight(date).unwrap_or(now);
    let end = if date >= now.date_naive() {
        now
    } else {
        NaiveTime::from_hms_opt(23, 59, 59)
            .and_then(|time| local_at(date, time))
            .unwrap_or(start)
    };
    (start, end.max(start))
}

/// The seven dates of the rolling week ending at `today`, oldest first.
pub fn week_dates(today: NaiveDate) -> [NaiveDate; DAYS_IN_WEEK] {
    let mut dates = [today; DAYS_IN_WEEK];
    for (offset, slot) in dates.iter_mut().rev().enumerate() {
        *slot = today - Duration::days(offset as i64);
    }
    dates
}

/// Day-of-week slot index, Sunday = 0.
pub fn weekday_slot(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}
