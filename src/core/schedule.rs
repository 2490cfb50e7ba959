use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use std::fmt;

/// The bar-close instant a scan is aligned to. Larger variants imply the
/// smaller ones (a weekly boundary is also a daily, 4h and hourly one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Boundary {
    Hour,
    FourHour,
    Day,
    Week,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Hour => write!(f, "hourly"),
            Boundary::FourHour => write!(f, "4-hour"),
            Boundary::Day => write!(f, "daily"),
            Boundary::Week => write!(f, "weekly"),
        }
    }
}

/// Largest UTC boundary `now` falls on, allowing up to `tolerance_secs`
/// seconds of drift past minute zero.
pub fn scan_boundary(now: DateTime<Utc>, tolerance_secs: u32) -> Option<Boundary> {
    if now.minute() != 0 || now.second() >= tolerance_secs {
        return None;
    }
    let midnight = now.hour() == 0;
    let boundary = if midnight && now.weekday() == Weekday::Mon {
        Boundary::Week
    } else if midnight {
        Boundary::Day
    } else if now.hour() % 4 == 0 {
        Boundary::FourHour
    } else {
        Boundary::Hour
    };
    Some(boundary)
}
