//! Calendar math for the booking picker.
//!
//! A month is rendered as a grid that starts on Sunday: `empty_days` blank
//! cells followed by one cell per day. Time slots are a fixed list.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("Year {0} is out of range")]
    InvalidYear(i32),
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Invalid time '{0}', expected e.g. '9:00 AM' or '14:30'")]
    InvalidTime(String),
}

/// A bookable time of day with a fixed availability flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub label: &'static str,
    pub avail: bool,
}

pub const TIME_SLOTS: [TimeSlot; 6] = [
    TimeSlot { label: "9:00 AM", avail: true },
    TimeSlot { label: "10:30 AM", avail: true },
    TimeSlot { label: "12:00 PM", avail: false },
    TimeSlot { label: "1:30 PM", avail: true },
    TimeSlot { label: "3:00 PM", avail: true },
    TimeSlot { label: "4:30 PM", avail: false },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    /// 1-based month
    pub month: u32,
    /// Blank cells before the 1st (Sunday = 0)
    pub empty_days: usize,
    pub days: Vec<u32>,
}

impl MonthGrid {
    pub fn next(&self) -> Result<MonthGrid, CalendarError> {
        if self.month == 12 {
            month_grid(self.year + 1, 1)
        } else {
            month_grid(self.year, self.month + 1)
        }
    }

    pub fn previous(&self) -> Result<MonthGrid, CalendarError> {
        if self.month == 1 {
            month_grid(self.year - 1, 12)
        } else {
            month_grid(self.year, self.month - 1)
        }
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    if !(1..=12).contains(&month) {
        return Err(CalendarError::InvalidMonth(month));
    }
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidYear(year))
}

/// Number of days in a Gregorian month (the day before the 1st of the next month)
pub fn days_in_month(year: i32, month: u32) -> Result<u32, CalendarError> {
    let first = first_of_month(year, month)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(CalendarError::InvalidYear(year))?;

    Ok(next_first.signed_duration_since(first).num_days() as u32)
}

/// Weekday of the 1st of the month, counting from Sunday = 0
pub fn first_weekday_offset(year: i32, month: u32) -> Result<usize, CalendarError> {
    let first = first_of_month(year, month)?;
    Ok(first.weekday().num_days_from_sunday() as usize)
}

pub fn month_grid(year: i32, month: u32) -> Result<MonthGrid, CalendarError> {
    let empty_days = first_weekday_offset(year, month)?;
    let count = days_in_month(year, month)?;

    Ok(MonthGrid {
        year,
        month,
        empty_days,
        days: (1..=count).collect(),
    })
}

pub fn month_grid_for(date: NaiveDate) -> MonthGrid {
    // The date is valid, so its month is too
    MonthGrid {
        year: date.year(),
        month: date.month(),
        empty_days: first_weekday_offset(date.year(), date.month()).unwrap_or(0),
        days: (1..=days_in_month(date.year(), date.month()).unwrap_or(0)).collect(),
    }
}

/// Parse a booking date from `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_booking_date(input: &str) -> Result<NaiveDate, CalendarError> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .map_err(|_| CalendarError::InvalidDate(input.to_string()))
}

/// Parse a 12-hour label ("9:00 AM") or 24-hour time ("14:30").
pub fn parse_time_label(input: &str) -> Result<NaiveTime, CalendarError> {
    let normalized = input.trim().to_uppercase();

    for format in ["%I:%M %p", "%I:%M%p", "%H:%M", "%H:%M:%S"] {
        if let Ok(time) = NaiveTime::parse_from_str(&normalized, format) {
            return Ok(time);
        }
    }

    Err(CalendarError::InvalidTime(input.to_string()))
}

/// Render a time as the canonical slot label, e.g. `1:30 PM`.
pub fn format_time_label(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        time.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

/// Normalize any accepted time input to the canonical 12-hour label.
pub fn normalize_time_label(input: &str) -> Result<String, CalendarError> {
    parse_time_label(input).map(format_time_label)
}

pub fn find_slot(label: &str) -> Option<&'static TimeSlot> {
    let canonical = normalize_time_label(label).ok()?;
    TIME_SLOTS.iter().find(|slot| slot.label == canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_in_month_matches_gregorian_calendar() {
        for year in [1900, 2000, 2023, 2024, 2100] {
            for month in 1..=12 {
                let expected = NaiveDate::from_ymd_opt(year, month, 1)
                    .unwrap()
                    .iter_days()
                    .take_while(|d| d.month() == month)
                    .count() as u32;
                assert_eq!(days_in_month(year, month).unwrap(), expected, "{}-{}", year, month);
            }
        }
    }

    #[test]
    fn test_leap_years() {
        assert_eq!(days_in_month(2024, 2).unwrap(), 29);
        assert_eq!(days_in_month(2023, 2).unwrap(), 28);
        assert_eq!(days_in_month(1900, 2).unwrap(), 28);
        assert_eq!(days_in_month(2000, 2).unwrap(), 29);
    }

    #[test]
    fn test_grid_offsets() {
        // 2024-09-01 was a Sunday, 2024-02-01 a Thursday, 2026-10-01 a Thursday
        let sept = month_grid(2024, 9).unwrap();
        assert_eq!(sept.empty_days, 0);
        assert_eq!(sept.days.len(), 30);

        let feb = month_grid(2024, 2).unwrap();
        assert_eq!(feb.empty_days, 4);
        assert_eq!(feb.days.len(), 29);
        assert_eq!(feb.days.first(), Some(&1));
        assert_eq!(feb.days.last(), Some(&29));

        let oct = month_grid(2026, 10).unwrap();
        assert_eq!(oct.empty_days, 4);
        assert_eq!(oct.days.len(), 31);
    }

    #[test]
    fn test_grid_matches_weekday_for_every_month() {
        for year in 2020..=2030 {
            for month in 1..=12 {
                let grid = month_grid(year, month).unwrap();
                let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
                assert_eq!(grid.empty_days, first.weekday().num_days_from_sunday() as usize);
                assert!(grid.empty_days < 7);
                assert_eq!(grid, month_grid_for(first));
            }
        }
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(month_grid(2024, 0), Err(CalendarError::InvalidMonth(0)));
        assert_eq!(month_grid(2024, 13), Err(CalendarError::InvalidMonth(13)));
    }

    #[test]
    fn test_navigation_crosses_year_boundary() {
        let dec = month_grid(2025, 12).unwrap();
        let jan = dec.next().unwrap();
        assert_eq!((jan.year, jan.month), (2026, 1));
        let back = jan.previous().unwrap();
        assert_eq!(back, dec);
        assert_eq!(dec.date(31), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(dec.date(32), None);
    }

    #[test]
    fn test_time_slots_are_fixed() {
        assert_eq!(TIME_SLOTS.len(), 6);
        for slot in TIME_SLOTS {
            assert_eq!(normalize_time_label(slot.label).unwrap(), slot.label);
        }
    }

    #[test]
    fn test_parse_time_label_accepts_both_clocks() {
        assert_eq!(normalize_time_label("9:00 AM").unwrap(), "9:00 AM");
        assert_eq!(normalize_time_label("09:00 am").unwrap(), "9:00 AM");
        assert_eq!(normalize_time_label("1:30PM").unwrap(), "1:30 PM");
        assert_eq!(normalize_time_label("13:30").unwrap(), "1:30 PM");
        assert_eq!(normalize_time_label("00:15").unwrap(), "12:15 AM");
        assert_eq!(normalize_time_label("12:00").unwrap(), "12:00 PM");

        assert!(parse_time_label("25:00").is_err());
        assert!(parse_time_label("noon").is_err());
        assert!(parse_time_label("").is_err());
    }

    #[test]
    fn test_find_slot() {
        assert_eq!(find_slot("15:00").map(|s| s.avail), Some(true));
        assert_eq!(find_slot("12:00 PM").map(|s| s.avail), Some(false));
        assert!(find_slot("8:00 AM").is_none());
    }

    #[test]
    fn test_parse_booking_date() {
        let expected = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        assert_eq!(parse_booking_date("2026-10-20").unwrap(), expected);
        assert_eq!(parse_booking_date("2026-10-20T00:00:00.000Z").unwrap(), expected);
        assert!(parse_booking_date("2026-02-30").is_err());
        assert!(parse_booking_date("20/10/2026").is_err());
    }
}
