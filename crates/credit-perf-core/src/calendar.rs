use chrono::{Datelike, NaiveDate};

/// Number of days in a given month/year.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let last = days_in_month(date.year(), date.month());
    NaiveDate::from_ymd_opt(date.year(), date.month(), last).unwrap_or(date)
}

/// Last calendar day of the month before the one containing `date`.
/// A date that is itself a month-end still rolls back a full month.
pub fn previous_month_end(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Every month-end from the month of `start` through `end`, inclusive.
pub fn month_ends(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = month_end(start);
    while current <= end {
        out.push(current);
        match current.succ_opt() {
            Some(next) => current = month_end(next),
            None => break,
        }
    }
    out
}

/// A given day of the month following `date` (e.g. 2023-02-28 → 2023-03-15).
pub fn day_of_next_month(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
}
