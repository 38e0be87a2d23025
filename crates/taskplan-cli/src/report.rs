//! Per-day report of scheduled work.
//!
//! `-r <expr>` renders one section per day from today through the resolved
//! Taskwarrior date expression: every task with hours booked on that day
//! (read back from the `scheduling` UDA the scheduler wrote), most urgent
//! first, with optional extra attributes. Tasks that have a due date but no
//! schedule land in a trailing "Unplanned" section.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use chrono::{Days, NaiveDate};
use serde_json::Value;

use taskplan_config::ReportConfig;
use taskplan_core::tw_instant;

use crate::taskwarrior;

pub fn render(report: &ReportConfig, expr: &str, taskrc: Option<&Path>) -> Result<()> {
    let tasks = taskwarrior::export_raw(taskrc)?;
    let end = taskwarrior::calc_date(taskrc, expr)?.date();
    let today = chrono::Local::now().date_naive();
    print!("{}", build_report(report, &tasks, today, end));
    Ok(())
}

/// Render the report for the inclusive date range `[today, end]`.
pub fn build_report(
    report: &ReportConfig,
    tasks: &[Value],
    today: NaiveDate,
    end: NaiveDate,
) -> String {
    let mut out = String::new();

    let mut date = today;
    while date <= end {
        let _ = writeln!(out, "# {} {}", date.format("%A"), date);
        let _ = writeln!(out);

        let mut scheduled = tasks_on(tasks, date);
        scheduled.sort_by(|(_, a), (_, b)| {
            urgency_of(b)
                .partial_cmp(&urgency_of(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_of(a).cmp(&id_of(b)))
        });

        if scheduled.is_empty() {
            let _ = writeln!(out, "(nothing scheduled)");
        }
        for (hours, task) in &scheduled {
            let _ = writeln!(
                out,
                "- {hours:.2}h  #{}{} {}",
                id_of(task),
                emoji_for(report, task),
                description_of(task)
            );
            for attribute in &report.additional_attributes {
                if let Some(value) = task.get(attribute) {
                    let _ = writeln!(out, "    {attribute}: {}", tostring(value));
                }
            }
        }
        let _ = writeln!(out);
        date = date + Days::new(1);
    }

    if report.include_unplanned {
        let unplanned = unplanned_tasks(tasks);
        if !unplanned.is_empty() {
            let _ = writeln!(out, "## Unplanned");
            let _ = writeln!(out);
            for task in unplanned {
                let due = task
                    .get("due")
                    .and_then(Value::as_str)
                    .map(|d| format!(" (due {})", tostring(&Value::String(d.to_string()))))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "- #{}{} {}{due}",
                    id_of(task),
                    emoji_for(report, task),
                    description_of(task)
                );
                for attribute in &report.additional_attributes_unplanned {
                    if attribute == "due" {
                        continue;
                    }
                    if let Some(value) = task.get(attribute) {
                        let _ = writeln!(out, "    {attribute}: {}", tostring(value));
                    }
                }
            }
        }
    }

    out
}

/// Tasks with hours booked on `date`, read from their `scheduling` notes.
fn tasks_on(tasks: &[Value], date: NaiveDate) -> Vec<(f64, &Value)> {
    tasks
        .iter()
        .filter_map(|task| {
            let note = task.get("scheduling")?.as_str()?;
            let hours = parse_scheduling_note(note).remove(&date)?;
            Some((hours, task))
        })
        .collect()
}

/// Pending tasks carrying a due date but no schedule.
fn unplanned_tasks(tasks: &[Value]) -> Vec<&Value> {
    tasks
        .iter()
        .filter(|task| {
            task.get("status").and_then(Value::as_str) == Some("pending")
                && task.get("due").is_some()
                && task.get("scheduling").is_none()
        })
        .collect()
}

/// Parse the note the emitter wrote: `"{date}: {hours:.2} hours"` lines.
fn parse_scheduling_note(note: &str) -> BTreeMap<NaiveDate, f64> {
    note.lines()
        .filter_map(|line| {
            let (date, rest) = line.split_once(": ")?;
            let date = date.trim().parse().ok()?;
            let hours = rest.trim().strip_suffix(" hours")?.parse().ok()?;
            Some((date, hours))
        })
        .collect()
}

fn urgency_of(task: &Value) -> f64 {
    task.get("urgency").and_then(Value::as_f64).unwrap_or(0.0)
}

fn id_of(task: &Value) -> u64 {
    task.get("id").and_then(Value::as_u64).unwrap_or(0)
}

fn description_of(task: &Value) -> &str {
    task.get("description").and_then(Value::as_str).unwrap_or("")
}

/// Shortcodes handed to tasks no keyword matched. Selection keys on the
/// description bytes so a task keeps its emoji across renders.
const FALLBACK_EMOJI: &[&str] = &[
    ":memo:",
    ":pushpin:",
    ":hammer:",
    ":books:",
    ":bulb:",
    ":wrench:",
    ":dart:",
    ":gear:",
];

/// First configured keyword found in the description wins; everything else
/// gets a stable fallback so every task is decorated.
fn emoji_for(report: &ReportConfig, task: &Value) -> String {
    let description = description_of(task).to_lowercase();
    let emoji = report
        .emoji_keywords
        .iter()
        .find(|(keyword, _)| description.contains(keyword.as_str()))
        .map(|(_, emoji)| emoji.as_str())
        .unwrap_or_else(|| fallback_emoji(description_of(task)));
    format!(" {emoji}")
}

fn fallback_emoji(description: &str) -> &'static str {
    let sum: usize = description.bytes().map(usize::from).sum();
    FALLBACK_EMOJI[sum % FALLBACK_EMOJI.len()]
}

/// Attribute formatting: booleans read Yes/No, compact instants become
/// readable timestamps, everything else prints as-is.
fn tostring(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::String(s) => match tw_instant::parse(s) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
            None => s.clone(),
        },
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
