//! Fuzzy temporal phrase resolution
//!
//! Resolves phrases like "last month" or "last 30 days" into concrete
//! inclusive calendar ranges anchored on a reference date. Matchers are
//! tried in a fixed priority order so overlapping phrasings resolve
//! deterministically; a phrase no matcher recognizes yields `None`.

use crate::models::DateRange;
use chrono::{Datelike, Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LAST_N_DAYS: Regex =
        Regex::new(r"last\s+(\S+)\s+days?\b").expect("valid last-N-days pattern");
}

/// Fallback window for "last ... days" when the count does not parse.
const DEFAULT_DAY_WINDOW: i64 = 30;

const MONTH_NAMES: &[(&str, u32)] = &[
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Resolve a free-form temporal phrase against a reference date.
///
/// Returns `None` when no pattern matches; never fails.
pub fn resolve(phrase: &str, reference: NaiveDate) -> Option<DateRange> {
    let phrase = phrase.to_lowercase();

    // 1. Previous calendar month, rolling the year back across January.
    if phrase.contains("last month")
        || phrase.contains("previous month")
        || phrase.contains("past month")
    {
        return previous_month(reference);
    }

    // 2. Current calendar month.
    if phrase.contains("this month") || phrase.contains("current month") {
        return month_span(reference.year(), reference.month());
    }

    // 3. "last N days": inclusive of the reference date, so the window
    // covers N+1 calendar days.
    if let Some(caps) = LAST_N_DAYS.captures(&phrase) {
        let n = caps[1].parse::<i64>().unwrap_or(DEFAULT_DAY_WINDOW).max(0);
        return Some(DateRange::new(reference - Duration::days(n), reference));
    }

    // 4. "last week" as a trailing 7-day window, not an ISO week.
    if phrase.contains("last week") || phrase.contains("past week") {
        return Some(DateRange::new(reference - Duration::days(7), reference));
    }

    // 5. Literal month name, always in the reference year. A month name
    // later than the reference month still resolves to the current year;
    // no past-year inference is attempted. Matched on whole tokens so
    // "may" does not fire inside "maybe".
    for token in phrase
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
    {
        for (name, month) in MONTH_NAMES {
            if token == *name {
                return month_span(reference.year(), *month);
            }
        }
    }

    // 6. Well-known recurring periods, approximate spans in the
    // reference year.
    if phrase.contains("black friday") {
        return span(reference.year(), 11, 20, 11, 30);
    }
    if phrase.contains("christmas") || phrase.contains("holiday season") {
        return span(reference.year(), 12, 18, 12, 26);
    }

    None
}

/// First and last day of the month preceding `reference`'s month.
fn previous_month(reference: NaiveDate) -> Option<DateRange> {
    let (year, month) = if reference.month() == 1 {
        (reference.year() - 1, 12)
    } else {
        (reference.year(), reference.month() - 1)
    };
    month_span(year, month)
}

/// First and last calendar day of a month. The month end is computed as
/// the day before the first of the following month, which is exact for
/// variable month lengths and leap years.
fn month_span(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange::new(start, next_first.pred_opt()?))
}

fn span(year: i32, sm: u32, sd: u32, em: u32, ed: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, sm, sd)?;
    let end = NaiveDate::from_ymd_opt(year, em, ed)?;
    Some(DateRange::new(start, end))
}
