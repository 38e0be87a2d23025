//! # taskplan-core
//!
//! Core domain model for the taskplan scheduler.
//!
//! This crate provides:
//! - Domain types: `Task`, `CalendarEvent`, `TimeMap`, `Duration`
//! - The urgency coefficient set extracted from Taskwarrior
//! - Serde glue for Taskwarrior's JSON export (compact instants,
//!   comma-joined dependency lists, stringly-typed numeric UDAs)
//!
//! ## Example
//!
//! ```rust
//! use taskplan_core::{Duration, TimeMap, ClockRange};
//! use chrono::Weekday;
//!
//! let estimated: Duration = "P0DT4H".parse().unwrap();
//! assert_eq!(estimated.as_hours(), 4.0);
//!
//! let mut map = TimeMap::new();
//! map.windows_mut(Weekday::Mon).push(ClockRange::new(9.0, 17.30));
//! ```

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

mod duration;
mod timemap;

pub use duration::{Duration, DurationParseError};
pub use timemap::{clock_to_hours, weekday_from_name, ClockRange, TimeMap};

/// Taskwarrior task identifier (working-set number; 0 outside the set)
pub type TaskId = u64;

/// Taskwarrior task uuid
pub type TaskUuid = String;

/// Allocations of one minute or less are treated as zero throughout the
/// allocator; 0.01 h is 36 seconds.
pub const MIN_ALLOCATION_HOURS: f64 = 0.01;

// ============================================================================
// Task snapshot
// ============================================================================

/// Task status as exported by Taskwarrior
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Waiting,
    Completed,
    Deleted,
    Recurring,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Statuses the allocator considers for scheduling.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Waiting)
    }
}

/// One task from the Taskwarrior export snapshot.
///
/// Only the attributes the scheduler consumes are modeled; everything else in
/// the export is ignored on deserialization.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,
    pub uuid: TaskUuid,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Estimated effort (duration UDA). Unparseable values read as `None`,
    /// which makes the task silently unschedulable.
    #[serde(default, deserialize_with = "de_lenient_duration")]
    pub estimated: Option<Duration>,
    /// Comma-separated time-map names (string UDA)
    #[serde(default)]
    pub time_map: Option<String>,
    #[serde(default)]
    pub urgency: f64,
    #[serde(default, with = "tw_instant_opt")]
    pub wait: Option<NaiveDateTime>,
    #[serde(default, with = "tw_instant_opt")]
    pub due: Option<NaiveDateTime>,
    #[serde(default, with = "tw_instant_opt")]
    pub entry: Option<NaiveDateTime>,
    /// Dependency uuids. Taskwarrior emits either a JSON list or a single
    /// comma-joined string depending on version.
    #[serde(default, deserialize_with = "de_depends")]
    pub depends: Vec<TaskUuid>,
    /// Per-task cap on a single day's allocation, in hours (numeric UDA).
    /// Historically named `min_block`; it acts as a ceiling.
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub min_block: Option<f64>,
}

impl Task {
    /// Time-map names in declaration order.
    pub fn time_map_names(&self) -> Vec<&str> {
        self.time_map
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect())
            .unwrap_or_default()
    }

    /// A task participates in scheduling when its status is active and both
    /// `estimated` and `time_map` are present.
    pub fn is_schedulable(&self) -> bool {
        self.status.is_active() && self.estimated.is_some() && self.time_map.is_some()
    }
}

// ============================================================================
// Calendar events
// ============================================================================

/// A busy interval from a blocking calendar, in scheduler-local wall clock.
///
/// Invariant: `end > start`. Per-calendar event lists are sorted by `start`
/// ascending. Events may straddle midnight; [`CalendarEvent::clip_to_date`]
/// yields the portion falling on one date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub all_day: bool,
}

impl CalendarEvent {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end, all_day: false }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    /// The event's extent on `date` as fractional hours from that midnight,
    /// clipped to `[0, 24]`. `None` when the event does not touch the date.
    pub fn clip_to_date(&self, date: NaiveDate) -> Option<(f64, f64)> {
        if self.start.date() > date || self.end.date() < date {
            return None;
        }
        let start_h = if self.start.date() < date { 0.0 } else { hours_into_day(self.start) };
        let end_h = if self.end.date() > date { 24.0 } else { hours_into_day(self.end) };
        if end_h - start_h <= 0.0 {
            // Ends exactly at (or before) this midnight
            return None;
        }
        Some((start_h, end_h))
    }
}

fn hours_into_day(dt: NaiveDateTime) -> f64 {
    use chrono::Timelike;
    f64::from(dt.time().hour())
        + f64::from(dt.time().minute()) / 60.0
        + f64::from(dt.time().second()) / 3600.0
}

// ============================================================================
// Urgency coefficients
// ============================================================================

/// Urgency knobs scraped from `task _show`.
///
/// `estimated` maps PDTH-keyed UDA coefficients
/// (`urgency.uda.estimated.<key>.coefficient`); the rest are Taskwarrior's
/// standard urgency settings.
#[derive(Clone, Debug, PartialEq)]
pub struct UrgencyCoefficients {
    pub estimated: BTreeMap<String, f64>,
    pub inherit: bool,
    pub active: f64,
    pub age_max: f64,
    pub age: f64,
    pub due: f64,
}

impl Default for UrgencyCoefficients {
    fn default() -> Self {
        // Taskwarrior's stock urgency configuration
        Self {
            estimated: BTreeMap::new(),
            inherit: false,
            active: 4.0,
            age_max: 365.0,
            age: 2.0,
            due: 12.0,
        }
    }
}

impl UrgencyCoefficients {
    /// Coefficient for the key whose hour value is nearest to
    /// `remaining_hours` rounded to integer hours. Ties break toward the
    /// smaller key. `None` when no key parses.
    pub fn estimated_coefficient(&self, remaining_hours: f64) -> Option<f64> {
        let target = remaining_hours.round() as i64;
        let mut keyed: Vec<(i64, f64)> = self
            .estimated
            .iter()
            .filter_map(|(key, &coeff)| {
                key.parse::<Duration>().ok().map(|d| (d.whole_hours(), coeff))
            })
            .collect();
        keyed.sort_by_key(|&(hours, _)| hours);

        let mut best: Option<(i64, f64)> = None;
        for (hours, coeff) in keyed {
            let dist = (hours - target).abs();
            match best {
                Some((best_dist, _)) if dist >= best_dist => {}
                _ => best = Some((dist, coeff)),
            }
        }
        best.map(|(_, coeff)| coeff)
    }
}

// ============================================================================
// Serde helpers for Taskwarrior's export format
// ============================================================================

/// Compact Taskwarrior instants: `YYYYMMDDTHHMMSSZ`.
pub mod tw_instant {
    use chrono::NaiveDateTime;

    pub const FORMAT: &str = "%Y%m%dT%H%M%SZ";

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(s, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S"))
            .ok()
    }

    pub fn emit(dt: NaiveDateTime) -> String {
        dt.format(FORMAT).to_string()
    }
}

mod tw_instant_opt {
    use super::tw_instant;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            None => Ok(None),
            Some(s) => tw_instant::parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid instant '{s}'"))),
        }
    }

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&tw_instant::emit(*dt)),
            None => serializer.serialize_none(),
        }
    }
}

fn de_lenient_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|s| s.parse().ok()))
}

fn de_lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }
    let value: Option<NumberOrString> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn de_depends<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Depends {
        List(Vec<String>),
        Joined(String),
    }
    let value: Option<Depends> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(Depends::List(uuids)) => uuids,
        Some(Depends::Joined(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    #[test]
    fn task_deserializes_from_taskwarrior_export() {
        let json = r#"{
            "id": 3,
            "uuid": "3b1b...-uuid",
            "description": "Write documentation",
            "estimated": "P0DT2H",
            "time_map": "work,evening",
            "urgency": 10.5,
            "status": "pending",
            "entry": "20231201T090000Z",
            "due": "20231210T170000Z",
            "depends": ["dep-1", "dep-2"],
            "min_block": "1.5",
            "project": "docs"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, 3);
        assert_eq!(task.estimated, Some(Duration::hours(2)));
        assert_eq!(task.time_map_names(), vec!["work", "evening"]);
        assert_eq!(task.due, Some(dt(2023, 12, 10, 17, 0)));
        assert_eq!(task.depends, vec!["dep-1".to_string(), "dep-2".to_string()]);
        assert_eq!(task.min_block, Some(1.5));
        assert!(task.is_schedulable());
    }

    #[test]
    fn depends_accepts_comma_joined_form() {
        let json = r#"{"uuid": "u", "depends": "a,b, c"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.depends, vec!["a", "b", "c"]);
    }

    #[test]
    fn unschedulable_without_estimate_or_time_map() {
        let task: Task = serde_json::from_str(r#"{"uuid": "u", "estimated": "P0DT1H"}"#).unwrap();
        assert!(!task.is_schedulable());
        let task: Task = serde_json::from_str(r#"{"uuid": "u", "time_map": "work"}"#).unwrap();
        assert!(!task.is_schedulable());
        let task: Task =
            serde_json::from_str(r#"{"uuid": "u", "status": "completed", "estimated": "P0DT1H", "time_map": "work"}"#)
                .unwrap();
        assert!(!task.is_schedulable());
    }

    #[test]
    fn garbage_estimate_reads_as_none() {
        let task: Task = serde_json::from_str(r#"{"uuid": "u", "estimated": "2 hours"}"#).unwrap();
        assert_eq!(task.estimated, None);
    }

    #[test]
    fn event_clipping_handles_midnight_straddle() {
        // 22:00 Dec 4 to 02:00 Dec 5
        let ev = CalendarEvent::new(dt(2023, 12, 4, 22, 0), dt(2023, 12, 5, 2, 0));
        assert_eq!(ev.clip_to_date(dt(2023, 12, 4, 0, 0).date()), Some((22.0, 24.0)));
        assert_eq!(ev.clip_to_date(dt(2023, 12, 5, 0, 0).date()), Some((0.0, 2.0)));
        assert_eq!(ev.clip_to_date(dt(2023, 12, 6, 0, 0).date()), None);
    }

    #[test]
    fn event_ending_at_midnight_does_not_block_next_day() {
        let ev = CalendarEvent::new(dt(2023, 12, 4, 14, 0), dt(2023, 12, 5, 0, 0));
        assert_eq!(ev.clip_to_date(dt(2023, 12, 4, 0, 0).date()), Some((14.0, 24.0)));
        assert_eq!(ev.clip_to_date(dt(2023, 12, 5, 0, 0).date()), None);
    }

    #[test]
    fn estimated_coefficient_picks_nearest_hour() {
        let mut coeffs = UrgencyCoefficients::default();
        coeffs.estimated.insert("P1H".into(), 5.0);
        coeffs.estimated.insert("P2H".into(), 8.0);
        coeffs.estimated.insert("P0DT4H".into(), 10.0);

        assert_eq!(coeffs.estimated_coefficient(1.0), Some(5.0));
        assert_eq!(coeffs.estimated_coefficient(2.4), Some(8.0));
        assert_eq!(coeffs.estimated_coefficient(5.0), Some(10.0));
        assert_eq!(coeffs.estimated_coefficient(100.0), Some(10.0));
    }

    #[test]
    fn estimated_coefficient_ties_break_toward_smaller_key() {
        let mut coeffs = UrgencyCoefficients::default();
        coeffs.estimated.insert("P1H".into(), 5.0);
        coeffs.estimated.insert("P3H".into(), 9.0);
        // 2h is equidistant from 1h and 3h
        assert_eq!(coeffs.estimated_coefficient(2.0), Some(5.0));
    }

    #[test]
    fn estimated_coefficient_empty_set_is_none() {
        assert_eq!(UrgencyCoefficients::default().estimated_coefficient(2.0), None);
    }
}
