//! Long-range availability: one vector of net hours per future day.
//!
//! Tasks sharing a time-map set share the expensive part of this computation,
//! so the builder memoizes vectors in a table owned by the allocator run.
//! `today_used` depends on the wall clock and is recomputed on every call.

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use tracing::debug;

use taskplan_core::{CalendarEvent, TimeMap};

use crate::availability::available_hours;
use crate::{Clock, SolveError};

/// Per-task availability over the scheduling horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct Horizon {
    /// Net available hours for each of the next `D` days, day 0 = today
    pub daily_hours: Vec<f64>,
    /// Hours of today's working windows the wall clock has already consumed
    pub today_used: f64,
}

/// Memo table for horizon vectors, keyed by the joined time-map names.
///
/// Owned by one allocator run and dropped with it; a changed calendar set
/// therefore never sees stale entries.
#[derive(Debug, Default)]
pub struct HorizonCache {
    vectors: HashMap<String, Vec<f64>>,
}

impl HorizonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability vector for `names` over `days` days, plus the fresh
    /// `today_used` figure.
    ///
    /// The cache key preserves the declared name order; `"work,evening"` and
    /// `"evening,work"` are distinct keys that produce equal vectors.
    pub fn long_range(
        &mut self,
        time_maps: &BTreeMap<String, TimeMap>,
        names: &[&str],
        days: usize,
        calendars: &[Vec<CalendarEvent>],
        clock: &Clock,
    ) -> Result<Horizon, SolveError> {
        let maps = names
            .iter()
            .map(|&name| {
                time_maps
                    .get(name)
                    .ok_or_else(|| SolveError::UnknownTimeMap { name: name.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let key = names.join(",");
        let daily_hours = match self.vectors.get(&key) {
            Some(vector) => {
                debug!("horizon cache hit for '{key}'");
                vector.clone()
            }
            None => {
                let vector: Vec<f64> = (0..days)
                    .map(|offset| {
                        let date = clock.today + Days::new(offset as u64);
                        maps.iter()
                            .map(|map| available_hours(map, date, calendars))
                            .sum()
                    })
                    .collect();
                self.vectors.insert(key, vector.clone());
                vector
            }
        };

        let today_used = maps
            .iter()
            .map(|map| hours_used_today(map, clock.today, clock.hour_of_day))
            .sum();

        Ok(Horizon { daily_hours, today_used })
    }
}

/// Hours of today's windows already behind the wall clock.
///
/// Per window, with `t` the current hour of day: inside the window count
/// `t - start` and stop scanning; past the window count its full length;
/// before it, nothing.
fn hours_used_today(map: &TimeMap, today: NaiveDate, hour_of_day: f64) -> f64 {
    let mut used = 0.0;
    for window in map.windows_on(today) {
        let (start, end) = (window.start_hours(), window.end_hours());
        if hour_of_day >= start && hour_of_day <= end {
            used += hour_of_day - start;
            break;
        } else if hour_of_day > end {
            used += end - start;
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use pretty_assertions::assert_eq;
    use taskplan_core::ClockRange;

    fn maps() -> BTreeMap<String, TimeMap> {
        let mut work = TimeMap::new();
        let mut evening = TimeMap::new();
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            work.windows_mut(day).push(ClockRange::new(9.0, 12.0));
            work.windows_mut(day).push(ClockRange::new(13.0, 17.0));
            evening.windows_mut(day).push(ClockRange::new(18.0, 22.0));
        }
        BTreeMap::from([("work".to_string(), work), ("evening".to_string(), evening)])
    }

    fn monday_clock(hour_of_day: f64) -> Clock {
        Clock {
            today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            hour_of_day,
        }
    }

    #[test]
    fn vector_sums_all_named_maps() {
        let mut cache = HorizonCache::new();
        let horizon = cache
            .long_range(&maps(), &["work", "evening"], 3, &[], &monday_clock(0.0))
            .unwrap();
        assert_eq!(horizon.daily_hours, vec![11.0, 11.0, 11.0]);
        assert_eq!(horizon.today_used, 0.0);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut cache = HorizonCache::new();
        let err = cache
            .long_range(&maps(), &["work", "gym"], 3, &[], &monday_clock(0.0))
            .unwrap_err();
        assert!(matches!(err, SolveError::UnknownTimeMap { name } if name == "gym"));
    }

    #[test]
    fn cache_returns_same_vector_and_fresh_today_used() {
        let mut cache = HorizonCache::new();
        let first = cache
            .long_range(&maps(), &["work"], 2, &[], &monday_clock(10.0))
            .unwrap();
        // Same key later in the (hypothetical) day
        let second = cache
            .long_range(&maps(), &["work"], 2, &[], &monday_clock(14.0))
            .unwrap();
        assert_eq!(first.daily_hours, second.daily_hours);
        assert_eq!(first.today_used, 1.0);
        assert_eq!(second.today_used, 4.0);
    }

    #[test]
    fn today_used_inside_first_window() {
        // 10:30 on a monday: 1.5h of the morning window gone
        let used = hours_used_today(
            &maps()["work"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            10.5,
        );
        assert_eq!(used, 1.5);
    }

    #[test]
    fn today_used_between_windows_counts_whole_morning() {
        let used = hours_used_today(
            &maps()["work"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            12.5,
        );
        assert_eq!(used, 3.0);
    }

    #[test]
    fn today_used_after_close_counts_everything() {
        let used = hours_used_today(
            &maps()["work"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            23.0,
        );
        assert_eq!(used, 7.0);
    }

    #[test]
    fn today_used_before_open_is_zero() {
        let used = hours_used_today(
            &maps()["work"],
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            7.0,
        );
        assert_eq!(used, 0.0);
    }
}
