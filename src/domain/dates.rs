/// Calendar-day helpers
///
/// All derived-state computations work on calendar days in a single reference
/// timezone (UTC). Instants are normalized here so the rest of the crate only
/// ever compares `NaiveDate`s.

use chrono::{Datelike, Duration, NaiveDate, Utc};

/// Today's calendar day in the reference timezone
pub fn today() -> NaiveDate {
    Utc::now().naive_utc().date()
}

/// `YYYY-MM-DD` key used for the wire format and the day-status cache
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` key used to bucket the day-status cache by month
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parse a `YYYY-MM-DD` string back into a calendar day
pub fn parse_day_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Inclusive range of days from `start` to `end`, oldest first
///
/// Returns an empty vec when `start > end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        days.push(cursor);
        cursor += Duration::days(1);
    }
    days
}

/// Whole calendar days from `earlier` to `later` (negative if reversed)
pub fn days_apart(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}
