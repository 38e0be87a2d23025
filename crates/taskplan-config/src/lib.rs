//! # taskplan-config
//!
//! TOML configuration for the taskplan scheduler.
//!
//! The file lives at `<config-dir>/taskplan/taskplan.toml` and carries four
//! sections:
//!
//! ```toml
//! [time_maps.work]
//! monday = [[9.00, 12.30], [13.30, 17.00]]
//! tuesday = [[9.00, 17.00]]
//!
//! [scheduler]
//! days_ahead = 14
//! algorithm = "parallel"
//! block = 2.0
//!
//! [calendars.team]
//! url = "https://example.com/team.ics"
//! expiration = 0.25
//! event_all_day_is_blocking = true
//! timezone = "Europe/Rome"
//!
//! [report]
//! include_unplanned = true
//! ```
//!
//! Window values use the decimal clock notation of
//! [`taskplan_core::ClockRange`] (`9.30` reads as 09:30). Loading validates
//! every invariant the solver relies on: known weekday names, windows sorted
//! and non-overlapping, `0.00 <= start < end <= 23.59`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use taskplan_core::{weekday_from_name, ClockRange, TimeMap};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed TOML in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("time map '{time_map}': unknown weekday '{weekday}'")]
    UnknownWeekday { time_map: String, weekday: String },

    #[error("time map '{time_map}', {weekday}: window {start}-{end} is invalid (want 0.00 <= start < end <= 23.59)")]
    InvalidWindow {
        time_map: String,
        weekday: String,
        start: f64,
        end: f64,
    },

    #[error("time map '{time_map}', {weekday}: windows must be sorted and non-overlapping")]
    OverlappingWindows { time_map: String, weekday: String },

    #[error("no config directory available for this platform")]
    NoConfigDir,
}

/// Scheduling algorithm selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Parallel,
    Sequential,
}

/// `[scheduler]` section
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Length of the scheduling horizon in days
    pub days_ahead: usize,
    pub algorithm: Algorithm,
    /// Legacy global per-day allocation cap in hours; the default for tasks
    /// without a `min_block` UDA
    pub block: f64,
    pub weight_urgency: f64,
    pub weight_due_date: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            days_ahead: 14,
            algorithm: Algorithm::Parallel,
            block: 2.0,
            weight_urgency: 1.0,
            weight_due_date: 1.0,
        }
    }
}

/// One `[calendars.<name>]` entry
#[derive(Clone, Debug, Deserialize)]
pub struct CalendarConfig {
    pub url: String,
    /// Cache lifetime in days; fractional values are fine (0.25 = 6 hours)
    #[serde(default = "default_expiration")]
    pub expiration: f64,
    #[serde(default)]
    pub event_all_day_is_blocking: bool,
    /// IANA timezone for floating event times; UTC when unset
    #[serde(default)]
    pub timezone: Option<String>,
}

fn default_expiration() -> f64 {
    1.0
}

/// `[report]` section (consumed by the report renderer, not the solver)
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub include_unplanned: bool,
    pub additional_attributes: Vec<String>,
    pub additional_attributes_unplanned: Vec<String>,
    pub emoji_keywords: BTreeMap<String, String>,
}

/// The whole configuration file
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub time_maps: BTreeMap<String, RawTimeMap>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarConfig>,
    #[serde(default)]
    pub report: ReportConfig,
}

/// A `[time_maps.<name>]` table as written: weekday name to `[start, end]`
/// decimal pairs.
pub type RawTimeMap = BTreeMap<String, Vec<[f64; 2]>>;

impl Config {
    /// Load and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default location: `<config-dir>/taskplan/taskplan.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join("taskplan").join("taskplan.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Validated time maps keyed by name.
    pub fn time_maps(&self) -> Result<BTreeMap<String, TimeMap>, ConfigError> {
        self.time_maps
            .iter()
            .map(|(name, raw)| Ok((name.clone(), build_time_map(name, raw)?)))
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.time_maps()?;
        Ok(())
    }
}

fn build_time_map(name: &str, raw: &RawTimeMap) -> Result<TimeMap, ConfigError> {
    let mut map = TimeMap::new();
    for (weekday_name, windows) in raw {
        let weekday = weekday_from_name(weekday_name).ok_or_else(|| ConfigError::UnknownWeekday {
            time_map: name.to_string(),
            weekday: weekday_name.clone(),
        })?;
        let day = map.windows_mut(weekday);
        for &[start, end] in windows {
            if !(0.0..=23.59).contains(&start) || !(0.0..=23.59).contains(&end) || start >= end {
                return Err(ConfigError::InvalidWindow {
                    time_map: name.to_string(),
                    weekday: weekday_name.clone(),
                    start,
                    end,
                });
            }
            day.push(ClockRange::new(start, end));
        }
        for pair in day.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(ConfigError::OverlappingWindows {
                    time_map: name.to_string(),
                    weekday: weekday_name.clone(),
                });
            }
        }
    }
    Ok(map)
}
