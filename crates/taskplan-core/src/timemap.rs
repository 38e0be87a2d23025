//! Weekly time maps: named templates of working-hour windows.
//!
//! Windows are written in *decimal clock* notation: the integer part is the
//! hour and the fraction encodes minutes over 100, so `9.30` reads as 09:30
//! and `13.45` as 13:45. Interpretation converts to ordinary fractional
//! hours (`H + M/60`) before any arithmetic.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Convert a decimal clock value (`9.30` = 09:30) to fractional hours.
pub fn clock_to_hours(clock: f64) -> f64 {
    let hours = clock.trunc();
    let minutes = (clock - hours) * 100.0;
    hours + minutes / 60.0
}

/// One working window within a day, in decimal clock values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockRange {
    pub start: f64,
    pub end: f64,
}

impl ClockRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Window start as fractional hours from midnight.
    pub fn start_hours(&self) -> f64 {
        clock_to_hours(self.start)
    }

    /// Window end as fractional hours from midnight.
    pub fn end_hours(&self) -> f64 {
        clock_to_hours(self.end)
    }

    /// Window length in fractional hours.
    pub fn duration_hours(&self) -> f64 {
        self.end_hours() - self.start_hours()
    }
}

/// A named weekly template of working-hour windows.
///
/// Invariants (enforced by the config layer): per day the windows are sorted,
/// non-overlapping, and each satisfies `0.00 <= start < end <= 23.59`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeMap {
    /// Windows per weekday, indexed Monday = 0 .. Sunday = 6.
    pub windows: [Vec<ClockRange>; 7],
}

impl TimeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Windows for the weekday of `date`. Empty slice if the day is off.
    pub fn windows_on(&self, date: NaiveDate) -> &[ClockRange] {
        &self.windows[date.weekday().num_days_from_monday() as usize]
    }

    pub fn windows_mut(&mut self, weekday: Weekday) -> &mut Vec<ClockRange> {
        &mut self.windows[weekday.num_days_from_monday() as usize]
    }

    /// Gross working hours on `date`, before any calendar blocking.
    pub fn gross_hours_on(&self, date: NaiveDate) -> f64 {
        self.windows_on(date).iter().map(ClockRange::duration_hours).sum()
    }

    /// True if no weekday has any window.
    pub fn is_empty(&self) -> bool {
        self.windows.iter().all(Vec::is_empty)
    }
}

/// Weekday name as it appears in configuration files.
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
