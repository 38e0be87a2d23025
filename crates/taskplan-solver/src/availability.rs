//! Net available hours for one date: time-map windows minus calendar busy
//! time.

use chrono::NaiveDate;

use taskplan_core::{CalendarEvent, TimeMap};

/// Net available hours on `date` under `time_map`, with every calendar's
/// events subtracted.
///
/// Events are expected sorted by start ascending per calendar; iteration
/// stops at the first event starting after `date`. Events straddling
/// midnight are clipped to the date before intersecting with the working
/// windows.
///
/// The result is *not* floored at zero: overlapping calendars can block more
/// than the windows hold, and callers clamp at point of use. An event
/// appearing in two calendars is blocked twice, for the same reason.
pub fn available_hours(
    time_map: &TimeMap,
    date: NaiveDate,
    calendars: &[Vec<CalendarEvent>],
) -> f64 {
    let windows = time_map.windows_on(date);
    if windows.is_empty() {
        return 0.0;
    }
    let gross: f64 = windows.iter().map(|w| w.duration_hours()).sum();

    let mut blocked = 0.0;
    for events in calendars {
        for event in events {
            if event.start_date() > date {
                break;
            }
            let Some((event_start, event_end)) = event.clip_to_date(date) else {
                continue;
            };
            for window in windows {
                let overlap =
                    window.end_hours().min(event_end) - window.start_hours().max(event_start);
                blocked += overlap.max(0.0);
            }
        }
    }

    gross - blocked
}
