//! iCalendar ingestion: fetch, cache, and flatten feeds into busy intervals.
//!
//! Each configured calendar is fetched over HTTP, cached on disk under the
//! user cache directory (file name: SHA-256 of the URL), and parsed into
//! [`CalendarEvent`]s in the scheduler's wall clock. A cache younger than the
//! calendar's `expiration` (days) is served without a network round trip;
//! `--force-update` bypasses it. A failed fetch without a fresh cache aborts
//! the run.
//!
//! The parser covers the subset the scheduler needs: line unfolding, VEVENT
//! blocks, UTC / TZID / floating / all-day datetimes, DURATION fallback, and
//! bounded expansion of DAILY and WEEKLY RRULEs (INTERVAL, COUNT, UNTIL)
//! across the scheduling window. Unsupported recurrence frequencies keep the
//! base occurrence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use taskplan_config::CalendarConfig;
use taskplan_core::CalendarEvent;

/// Inclusive date window events are expanded and kept for.
pub type Window = (NaiveDate, NaiveDate);

/// Load every configured calendar, sorted events per calendar.
pub fn load_calendars(
    configs: &BTreeMap<String, CalendarConfig>,
    window: Window,
    force_update: bool,
) -> Result<Vec<Vec<CalendarEvent>>> {
    configs
        .iter()
        .map(|(name, config)| load_calendar(name, config, window, force_update))
        .collect()
}

fn load_calendar(
    name: &str,
    config: &CalendarConfig,
    window: Window,
    force_update: bool,
) -> Result<Vec<CalendarEvent>> {
    let timezone = config
        .timezone
        .as_deref()
        .map(|tz| {
            tz.parse::<Tz>()
                .map_err(|_| anyhow!("calendar '{name}': unknown timezone '{tz}'"))
        })
        .transpose()?;

    let body = fetch_with_cache(name, config, force_update)?;
    Ok(parse_events(
        &body,
        timezone,
        config.event_all_day_is_blocking,
        window,
    ))
}

// ============================================================================
// Fetch + cache
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CachedFeed {
    /// UTC instant of the successful fetch
    fetched_at: NaiveDateTime,
    body: String,
}

fn fetch_with_cache(name: &str, config: &CalendarConfig, force_update: bool) -> Result<String> {
    let path = cache_path(&config.url)?;

    if !force_update {
        if let Some(feed) = read_cache(&path) {
            if is_fresh(&feed, config.expiration, Utc::now().naive_utc()) {
                debug!("calendar '{name}': serving cached feed");
                return Ok(feed.body);
            }
        }
    }

    let body = fetch(&config.url)
        .with_context(|| format!("calendar '{name}' unavailable and no fresh cache exists"))?;
    if let Err(err) = write_cache(&path, &body) {
        warn!("calendar '{name}': cannot write cache: {err}");
    }
    Ok(body)
}

fn fetch(url: &str) -> Result<String> {
    let response = ureq::get(url).call().with_context(|| format!("GET {url} failed"))?;
    response
        .into_string()
        .with_context(|| format!("reading body of {url} failed"))
}

fn cache_path(url: &str) -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context("no cache directory available for this platform")?
        .join("taskplan");
    fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create cache directory '{}'", dir.display()))?;
    let digest = Sha256::digest(url.as_bytes());
    let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(dir.join(format!("{name}.json")))
}

fn read_cache(path: &Path) -> Option<CachedFeed> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn write_cache(path: &Path, body: &str) -> Result<()> {
    let feed = CachedFeed {
        fetched_at: Utc::now().naive_utc(),
        body: body.to_string(),
    };
    fs::write(path, serde_json::to_string(&feed)?)?;
    Ok(())
}

fn is_fresh(feed: &CachedFeed, expiration_days: f64, now: NaiveDateTime) -> bool {
    let age = now - feed.fetched_at;
    (age.num_seconds() as f64) < expiration_days * 86_400.0
}

// ============================================================================
// ICS parsing
// ============================================================================

#[derive(Debug, Default)]
struct RawEvent {
    dtstart: Option<(Vec<String>, String)>,
    dtend: Option<(Vec<String>, String)>,
    duration: Option<String>,
    rrule: Option<String>,
}

/// Parse an ICS document into sorted busy intervals in the scheduler's wall
/// clock.
///
/// `timezone` is the calendar's configured zone: UTC instants are converted
/// into it, floating times are taken as already being in it. All-day events
/// are dropped entirely unless `all_day_blocking` is set.
pub fn parse_events(
    ics: &str,
    timezone: Option<Tz>,
    all_day_blocking: bool,
    window: Window,
) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current: Option<RawEvent> = None;

    for line in unfold(ics) {
        if line == "BEGIN:VEVENT" {
            current = Some(RawEvent::default());
            continue;
        }
        if line == "END:VEVENT" {
            if let Some(raw) = current.take() {
                events.extend(build_occurrences(raw, timezone, all_day_blocking, window));
            }
            continue;
        }
        let Some(raw) = current.as_mut() else { continue };
        let Some((name, value)) = line.split_once(':') else { continue };
        let mut name_parts = name.split(';');
        let property = name_parts.next().unwrap_or_default();
        let params: Vec<String> = name_parts.map(String::from).collect();
        match property {
            "DTSTART" => raw.dtstart = Some((params, value.to_string())),
            "DTEND" => raw.dtend = Some((params, value.to_string())),
            "DURATION" => raw.duration = Some(value.to_string()),
            "RRULE" => raw.rrule = Some(value.to_string()),
            _ => {}
        }
    }

    events.sort_by_key(|event| event.start);
    events
}

/// Undo RFC 5545 line folding: a line starting with space or tab continues
/// the previous one.
fn unfold(ics: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in ics.lines() {
        let trimmed = raw.trim_end_matches('\r');
        if trimmed.starts_with(' ') || trimmed.starts_with('\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(&trimmed[1..]);
            }
        } else {
            lines.push(trimmed.to_string());
        }
    }
    lines
}

fn build_occurrences(
    raw: RawEvent,
    timezone: Option<Tz>,
    all_day_blocking: bool,
    window: Window,
) -> Vec<CalendarEvent> {
    let Some((start, all_day)) = raw
        .dtstart
        .as_ref()
        .and_then(|(params, value)| parse_datetime(params, value, timezone))
    else {
        return Vec::new();
    };
    if all_day && !all_day_blocking {
        return Vec::new();
    }

    let end = raw
        .dtend
        .as_ref()
        .and_then(|(params, value)| parse_datetime(params, value, timezone))
        .map(|(end, _)| end)
        .or_else(|| {
            // DURATION values are ISO durations; the PDTH codec reads them
            let duration = raw.duration.as_deref()?.parse::<taskplan_core::Duration>().ok()?;
            Some(start + TimeDelta::minutes(duration.minutes))
        })
        .or_else(|| all_day.then(|| start + TimeDelta::days(1)));
    let Some(end) = end else { return Vec::new() };
    if end <= start {
        return Vec::new();
    }

    let base = CalendarEvent { start, end, all_day };
    let occurrences = match raw.rrule.as_deref() {
        Some(rule) => expand_rrule(&base, rule, timezone, window),
        None => vec![base],
    };
    occurrences
        .into_iter()
        .filter(|event| event.end.date() >= window.0 && event.start.date() <= window.1)
        .collect()
}

/// Parse a DTSTART/DTEND value given its parameters. Returns the wall-clock
/// datetime and whether it was a date-only (all-day) value.
fn parse_datetime(
    params: &[String],
    value: &str,
    timezone: Option<Tz>,
) -> Option<(NaiveDateTime, bool)> {
    let is_date = params.iter().any(|p| p == "VALUE=DATE") || !value.contains('T');
    if is_date {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
        return Some((date.and_time(NaiveTime::MIN), true));
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let utc = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        let local = match timezone {
            Some(tz) => Utc.from_utc_datetime(&utc).with_timezone(&tz).naive_local(),
            None => utc,
        };
        return Some((local, false));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?;
    if let Some(zone_name) = params.iter().find_map(|p| p.strip_prefix("TZID=")) {
        if let Ok(zone) = zone_name.parse::<Tz>() {
            if let Some(instant) = zone.from_local_datetime(&naive).earliest() {
                let local = match timezone {
                    Some(tz) => instant.with_timezone(&tz).naive_local(),
                    None => instant.with_timezone(&Utc).naive_local(),
                };
                return Some((local, false));
            }
        }
    }
    // Floating time: already wall clock
    Some((naive, false))
}

/// Expand a DAILY or WEEKLY recurrence across the window. Any other
/// frequency keeps the base occurrence only.
fn expand_rrule(
    base: &CalendarEvent,
    rule: &str,
    timezone: Option<Tz>,
    window: Window,
) -> Vec<CalendarEvent> {
    let mut freq: Option<&str> = None;
    let mut interval: i64 = 1;
    let mut count: Option<usize> = None;
    let mut until: Option<NaiveDateTime> = None;

    for part in rule.split(';') {
        let Some((key, value)) = part.split_once('=') else { continue };
        match key {
            "FREQ" => freq = Some(value),
            "INTERVAL" => interval = value.parse().unwrap_or(1),
            "COUNT" => count = value.parse().ok(),
            "UNTIL" => until = parse_until(value, timezone),
            _ => {}
        }
    }

    let step_days = match freq {
        Some("DAILY") => interval.max(1),
        Some("WEEKLY") => 7 * interval.max(1),
        other => {
            debug!("unsupported RRULE frequency {other:?}, keeping base occurrence");
            return vec![base.clone()];
        }
    };

    let span = base.end - base.start;
    let mut occurrences = Vec::new();
    let mut start = base.start;
    while start.date() <= window.1 {
        if count.is_some_and(|c| occurrences.len() >= c) {
            break;
        }
        if until.is_some_and(|u| start > u) {
            break;
        }
        occurrences.push(CalendarEvent {
            start,
            end: start + span,
            all_day: base.all_day,
        });
        start = start + TimeDelta::days(step_days);
    }
    occurrences
}

/// UNTIL values in UTC get the same conversion as DTSTART, so the cutoff
/// compares against occurrence starts in the same wall clock.
fn parse_until(value: &str, timezone: Option<Tz>) -> Option<NaiveDateTime> {
    if let Some(stripped) = value.strip_suffix('Z') {
        let utc = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S").ok()?;
        return Some(match timezone {
            Some(tz) => Utc.from_utc_datetime(&utc).with_timezone(&tz).naive_local(),
            None => utc,
        });
    }
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:test\r\n\
BEGIN:VEVENT\r\n\
UID:meeting-1\r\n\
DTSTART:20231205T140000Z\r\n\
DTEND:20231205T150000Z\r\n\
SUMMARY:Test Meeting with a folded\r\n\
 summary line\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:standup\r\n\
DTSTART:20231206T100000Z\r\n\
DTEND:20231206T101500Z\r\n\
RRULE:FREQ=WEEKLY;COUNT=3\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:offsite\r\n\
DTSTART;VALUE=DATE:20231207\r\n\
DTEND;VALUE=DATE:20231208\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn window() -> Window {
        (
            NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        )
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn parses_timed_events_in_utc_by_default() {
        let events = parse_events(FEED, None, true, window());
        assert_eq!(events[0].start, dt(2023, 12, 5, 14, 0));
        assert_eq!(events[0].end, dt(2023, 12, 5, 15, 0));
        assert!(!events[0].all_day);
    }

    #[test]
    fn weekly_rrule_expands_to_count() {
        let events = parse_events(FEED, None, true, window());
        let standups: Vec<_> = events
            .iter()
            .filter(|e| e.start.time() == NaiveTime::from_hms_opt(10, 0, 0).unwrap())
            .collect();
        assert_eq!(standups.len(), 3);
        assert_eq!(standups[1].start, dt(2023, 12, 13, 10, 0));
        assert_eq!(standups[2].start, dt(2023, 12, 20, 10, 0));
    }

    #[test]
    fn all_day_events_span_midnight_to_midnight() {
        let events = parse_events(FEED, None, true, window());
        let offsite = events.iter().find(|e| e.all_day).unwrap();
        assert_eq!(offsite.start, dt(2023, 12, 7, 0, 0));
        assert_eq!(offsite.end, dt(2023, 12, 8, 0, 0));
    }

    #[test]
    fn all_day_events_drop_when_not_blocking() {
        let events = parse_events(FEED, None, false, window());
        assert!(events.iter().all(|e| !e.all_day));
    }

    #[test]
    fn events_are_sorted_by_start() {
        let events = parse_events(FEED, None, true, window());
        for pair in events.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[test]
    fn utc_events_convert_into_the_calendar_timezone() {
        // December: Europe/Rome is UTC+1
        let tz: Tz = "Europe/Rome".parse().unwrap();
        let events = parse_events(FEED, Some(tz), true, window());
        assert_eq!(events[0].start, dt(2023, 12, 5, 15, 0));
    }

    #[test]
    fn tzid_events_resolve_through_their_zone() {
        let ics = "BEGIN:VEVENT\n\
DTSTART;TZID=America/New_York:20231205T090000\n\
DTEND;TZID=America/New_York:20231205T100000\n\
END:VEVENT\n";
        // 09:00 New York is 14:00 UTC in December
        let events = parse_events(ics, None, true, window());
        assert_eq!(events[0].start, dt(2023, 12, 5, 14, 0));
    }

    #[test]
    fn duration_fallback_supplies_the_end() {
        let ics = "BEGIN:VEVENT\n\
DTSTART:20231205T140000Z\n\
DURATION:PT1H30M\n\
END:VEVENT\n";
        let events = parse_events(ics, None, true, window());
        assert_eq!(events[0].end, dt(2023, 12, 5, 15, 30));
    }

    #[test]
    fn daily_rrule_respects_until() {
        let ics = "BEGIN:VEVENT\n\
DTSTART:20231205T080000Z\n\
DTEND:20231205T083000Z\n\
RRULE:FREQ=DAILY;UNTIL=20231207T235959Z\n\
END:VEVENT\n";
        let events = parse_events(ics, None, true, window());
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn until_converts_into_the_calendar_timezone() {
        // 23:00Z is midnight in Rome; an unconverted UNTIL would cut off the
        // final occurrence
        let ics = "BEGIN:VEVENT\n\
DTSTART:20231205T230000Z\n\
DTEND:20231205T233000Z\n\
RRULE:FREQ=DAILY;UNTIL=20231207T230000Z\n\
END:VEVENT\n";
        let tz: Tz = "Europe/Rome".parse().unwrap();
        let events = parse_events(ics, Some(tz), true, window());
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].start, dt(2023, 12, 8, 0, 0));
    }

    #[test]
    fn events_outside_the_window_are_dropped() {
        let ics = "BEGIN:VEVENT\n\
DTSTART:20250105T080000Z\n\
DTEND:20250105T083000Z\n\
END:VEVENT\n";
        let events = parse_events(ics, None, true, window());
        assert!(events.is_empty());
    }

    #[test]
    fn cache_freshness_follows_expiration() {
        let feed = CachedFeed {
            fetched_at: dt(2023, 12, 5, 0, 0),
            body: String::new(),
        };
        // Six-hour expiration (0.25 days)
        assert!(is_fresh(&feed, 0.25, dt(2023, 12, 5, 5, 0)));
        assert!(!is_fresh(&feed, 0.25, dt(2023, 12, 5, 7, 0)));
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        write_cache(&path, "BEGIN:VCALENDAR").unwrap();
        let feed = read_cache(&path).unwrap();
        assert_eq!(feed.body, "BEGIN:VCALENDAR");
    }

    #[test]
    fn missing_cache_reads_as_none() {
        assert!(read_cache(Path::new("/nonexistent/feed.json")).is_none());
    }
}
