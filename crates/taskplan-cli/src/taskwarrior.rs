//! Subprocess interface to Taskwarrior.
//!
//! Four invocations, all blocking: `task export` for the snapshot,
//! `task _show` for the urgency coefficients, `task <uuid> modify` to write
//! scheduling annotations back, and `task calc` to resolve date expressions
//! for reports. `--taskrc` is forwarded through the `TASKRC` environment
//! variable so every call sees the same database.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use regex::Regex;

use taskplan_core::{Task, UrgencyCoefficients};
use taskplan_solver::ScheduledTask;

fn task_command(taskrc: Option<&Path>) -> Command {
    let mut cmd = Command::new("task");
    if let Some(path) = taskrc {
        cmd.env("TASKRC", path);
    }
    cmd
}

/// Snapshot of the task database as typed tasks.
pub fn export(taskrc: Option<&Path>) -> Result<Vec<Task>> {
    let raw = export_raw(taskrc)?;
    // Round-trip through the typed model; attributes the scheduler ignores
    // are dropped here
    raw.into_iter()
        .map(|value| serde_json::from_value(value).context("malformed task in export"))
        .collect()
}

/// Snapshot of the task database as raw JSON objects, for consumers that
/// need arbitrary attributes (the report renderer).
pub fn export_raw(taskrc: Option<&Path>) -> Result<Vec<serde_json::Value>> {
    let output = task_command(taskrc)
        .arg("export")
        .output()
        .context("failed to run 'task export'; is Taskwarrior installed?")?;
    if !output.status.success() {
        bail!(
            "'task export' exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout)
        .context("'task export' did not return a JSON task array")
}

/// Urgency coefficients from the Taskwarrior configuration dump.
pub fn urgency_coefficients(taskrc: Option<&Path>) -> Result<UrgencyCoefficients> {
    let output = task_command(taskrc)
        .arg("_show")
        .output()
        .context("failed to run 'task _show'")?;
    if !output.status.success() {
        bail!("'task _show' exited with {}", output.status);
    }
    parse_coefficients(&String::from_utf8_lossy(&output.stdout))
}

/// Scan `task _show` output for the urgency settings the scheduler models.
/// Anything absent keeps Taskwarrior's stock default.
fn parse_coefficients(show: &str) -> Result<UrgencyCoefficients> {
    let estimated =
        Regex::new(r"^urgency\.uda\.estimated\.(.+)\.coefficient=(.+)$").context("bad pattern")?;

    let mut coefficients = UrgencyCoefficients::default();
    for line in show.lines() {
        if let Some(caps) = estimated.captures(line) {
            if let Ok(value) = caps[2].trim().parse::<f64>() {
                coefficients.estimated.insert(caps[1].to_string(), value);
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        let value = value.trim();
        match key {
            "urgency.inherit" => {
                coefficients.inherit = matches!(value, "1" | "on" | "yes" | "true");
            }
            "urgency.active.coefficient" => {
                if let Ok(v) = value.parse() {
                    coefficients.active = v;
                }
            }
            "urgency.age.max" => {
                if let Ok(v) = value.parse() {
                    coefficients.age_max = v;
                }
            }
            "urgency.age.coefficient" => {
                if let Ok(v) = value.parse() {
                    coefficients.age = v;
                }
            }
            "urgency.due.coefficient" => {
                if let Ok(v) = value.parse() {
                    coefficients.due = v;
                }
            }
            _ => {}
        }
    }
    Ok(coefficients)
}

/// Write one task's scheduling annotations back to the database.
pub fn write_schedule(taskrc: Option<&Path>, scheduled: &ScheduledTask) -> Result<()> {
    let status = task_command(taskrc)
        .arg(&scheduled.uuid)
        .arg("modify")
        .arg(format!("scheduled:{}", scheduled.start_date))
        .arg(format!("completion_date:{}", scheduled.end_date))
        // Taskwarrior's modifier parser wants multi-line UDA values quoted
        // even without a shell in between
        .arg(format!("scheduling:\"{}\"", scheduled.note))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("failed to run 'task modify' for task {}", scheduled.id))?;
    if !status.success() {
        bail!("'task modify' failed for task {} ({})", scheduled.id, scheduled.uuid);
    }
    Ok(())
}

/// Resolve a Taskwarrior date expression (`today`, `eow`, `friday`, `1day`)
/// via `task calc`. Bare offsets like `1day` only resolve with an anchor, so
/// a failed attempt retries as `today+<expr>`.
pub fn calc_date(taskrc: Option<&Path>, expr: &str) -> Result<NaiveDateTime> {
    if let Some(date) = try_calc(taskrc, expr)? {
        return Ok(date);
    }
    if let Some(date) = try_calc(taskrc, &format!("today+{expr}"))? {
        return Ok(date);
    }
    bail!("cannot resolve date expression '{expr}'")
}

fn try_calc(taskrc: Option<&Path>, expr: &str) -> Result<Option<NaiveDateTime>> {
    let output = task_command(taskrc)
        .args(["rc.verbose=nothing", "calc", expr])
        .output()
        .context("failed to run 'task calc'")?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(NaiveDateTime::parse_from_str(stdout.trim(), "%Y-%m-%dT%H:%M:%S").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHOW_OUTPUT: &str = "\
urgency.uda.estimated.P1H.coefficient=5.0
urgency.uda.estimated.P2H.coefficient=8.0
urgency.uda.estimated.P0DT4H.coefficient=10.0
urgency.inherit=1
urgency.active.coefficient=4.0
urgency.age.max=365
urgency.due.coefficient=12.0
urgency.age.coefficient=2.0
weekstart=monday";

    #[test]
    fn scans_estimated_coefficients() {
        let coefficients = parse_coefficients(SHOW_OUTPUT).unwrap();
        assert_eq!(coefficients.estimated.len(), 3);
        assert_eq!(coefficients.estimated["P1H"], 5.0);
        assert_eq!(coefficients.estimated["P0DT4H"], 10.0);
    }

    #[test]
    fn scans_standard_urgency_settings() {
        let coefficients = parse_coefficients(SHOW_OUTPUT).unwrap();
        assert!(coefficients.inherit);
        assert_eq!(coefficients.active, 4.0);
        assert_eq!(coefficients.age_max, 365.0);
        assert_eq!(coefficients.age, 2.0);
        assert_eq!(coefficients.due, 12.0);
    }

    #[test]
    fn missing_settings_keep_defaults() {
        let coefficients = parse_coefficients("weekstart=monday").unwrap();
        assert_eq!(coefficients, UrgencyCoefficients::default());
    }
}
