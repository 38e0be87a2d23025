//! ISO-8601-style work durations as Taskwarrior emits them.
//!
//! Taskwarrior serializes duration UDAs in a `P<days>DT<hours>H` shape
//! (`P1DT2H`, `PT30M`, `P2D`, ...). Internally we keep minutes so the
//! codec never accumulates float error; allocation math converts to
//! fractional hours at the edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Duration in working time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    /// Number of minutes
    pub minutes: i64,
}

impl Duration {
    pub const fn zero() -> Self {
        Self { minutes: 0 }
    }

    pub const fn minutes(m: i64) -> Self {
        Self { minutes: m }
    }

    pub const fn hours(h: i64) -> Self {
        Self { minutes: h * 60 }
    }

    pub const fn days(d: i64) -> Self {
        Self { minutes: d * 24 * 60 }
    }

    pub fn as_hours(&self) -> f64 {
        self.minutes as f64 / 60.0
    }

    /// Build from fractional hours, rounding to whole minutes.
    pub fn from_hours_f64(hours: f64) -> Self {
        Self { minutes: (hours * 60.0).round() as i64 }
    }

    /// Whole hours, fractional remainder dropped.
    pub fn whole_hours(&self) -> i64 {
        self.minutes / 60
    }

    /// Emit the canonical `P{d}DT{h}H` form.
    ///
    /// Sub-hour precision is dropped: `P0DT2H` comes back from 2.6 hours.
    /// The coefficient keys this feeds are whole-hour by convention, so the
    /// lossy round-trip is accepted.
    pub fn to_pdth(&self) -> String {
        let hours = self.whole_hours();
        format!("P{}DT{}H", hours / 24, hours % 24)
    }
}

impl std::ops::Add for Duration {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { minutes: self.minutes + rhs.minutes }
    }
}

impl std::ops::Sub for Duration {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self { minutes: self.minutes - rhs.minutes }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_pdth())
    }
}

/// Error parsing a PDTH duration string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration '{input}': {reason}")]
pub struct DurationParseError {
    pub input: String,
    pub reason: &'static str,
}

impl DurationParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self { input: input.to_string(), reason }
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    /// Accepts `P[<d>D][T[<h>H][<m>M]]` with non-negative integer fields.
    /// Every field is optional but the leading `P` is not, and a bare `P`
    /// or a `T` with nothing after it is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('P')
            .ok_or_else(|| DurationParseError::new(s, "missing leading 'P'"))?;
        if rest.is_empty() {
            return Err(DurationParseError::new(s, "empty duration"));
        }

        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (rest, None),
        };

        let mut minutes: i64 = 0;
        let mut saw_field = false;

        if !date_part.is_empty() {
            // Coefficient keys in the wild use the lax `P2H` form with no `T`
            // separator; treat a trailing `H` here as hours.
            if let Some(h) = date_part.strip_suffix('H') {
                let hours = h
                    .parse::<i64>()
                    .map_err(|_| DurationParseError::new(s, "malformed hours component"))?;
                minutes += hours * 60;
            } else {
                let days = date_part
                    .strip_suffix('D')
                    .and_then(|n| n.parse::<i64>().ok())
                    .ok_or_else(|| DurationParseError::new(s, "malformed days component"))?;
                minutes += days * 24 * 60;
            }
            saw_field = true;
        }

        if let Some(time) = time_part {
            if time.is_empty() {
                return Err(DurationParseError::new(s, "empty time component"));
            }
            let (hours_str, minutes_str) = match time.split_once('H') {
                Some((h, m)) => (Some(h), m),
                None => (None, time),
            };
            if let Some(h) = hours_str {
                let hours = h
                    .parse::<i64>()
                    .map_err(|_| DurationParseError::new(s, "malformed hours component"))?;
                minutes += hours * 60;
                saw_field = true;
            }
            if !minutes_str.is_empty() {
                let mins = minutes_str
                    .strip_suffix('M')
                    .and_then(|n| n.parse::<i64>().ok())
                    .ok_or_else(|| DurationParseError::new(s, "malformed minutes component"))?;
                minutes += mins;
                saw_field = true;
            }
        }

        if !saw_field {
            return Err(DurationParseError::new(s, "no duration fields"));
        }
        if minutes < 0 {
            return Err(DurationParseError::new(s, "negative duration"));
        }

        Ok(Self { minutes })
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_pdth())
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
