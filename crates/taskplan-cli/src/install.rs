//! `--install`: wire the scheduler's UDAs into the user's taskrc.
//!
//! Appends the UDA declarations (`estimated`, `time_map`, `min_block`,
//! `scheduling`, `completion_date`) and a default ladder of estimated
//! urgency coefficients. Keys already present in the file are left alone, so
//! re-running is safe and user overrides survive.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const TASKRC_LINES: &[&str] = &[
    "uda.estimated.type=duration",
    "uda.estimated.label=Estimated",
    "uda.time_map.type=string",
    "uda.time_map.label=Time Map",
    "uda.time_map.default=work",
    "uda.min_block.type=numeric",
    "uda.min_block.label=Min Block",
    "uda.min_block.default=2",
    "uda.scheduling.type=string",
    "uda.scheduling.label=Scheduling",
    "uda.completion_date.type=date",
    "uda.completion_date.label=Completion Date",
    // Short tasks earn more urgency per remaining hour
    "urgency.uda.estimated.P0DT1H.coefficient=10.0",
    "urgency.uda.estimated.P0DT2H.coefficient=8.8",
    "urgency.uda.estimated.P0DT4H.coefficient=7.8",
    "urgency.uda.estimated.P0DT8H.coefficient=7.0",
    "urgency.uda.estimated.P1DT0H.coefficient=6.0",
    "urgency.uda.estimated.P2DT0H.coefficient=5.0",
    "urgency.uda.estimated.P3DT0H.coefficient=4.4",
    "urgency.uda.estimated.P7DT0H.coefficient=3.0",
];

pub fn run(taskrc: Option<&Path>) -> Result<()> {
    let path = locate_taskrc(taskrc)?;
    let existing = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read taskrc '{}'", path.display()))?;

    let missing = missing_lines(&existing);
    if missing.is_empty() {
        println!("{} already carries the taskplan configuration", path.display());
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open taskrc '{}' for writing", path.display()))?;
    writeln!(file, "\n# taskplan UDAs and urgency coefficients")?;
    for line in &missing {
        writeln!(file, "{line}")?;
    }

    println!("added {} settings to {}", missing.len(), path.display());
    Ok(())
}

fn locate_taskrc(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os("TASKRC") {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".taskrc"))
        .context("cannot locate a taskrc; pass --taskrc")
}

/// Lines whose key (text before `=`) does not yet appear in the file.
fn missing_lines(existing: &str) -> Vec<&'static str> {
    let present: Vec<&str> = existing
        .lines()
        .filter_map(|line| line.split('=').next())
        .map(str::trim)
        .collect();
    TASKRC_LINES
        .iter()
        .filter(|line| {
            let key = line.split('=').next().unwrap_or_default();
            !present.contains(&key)
        })
        .copied()
        .collect()
}
