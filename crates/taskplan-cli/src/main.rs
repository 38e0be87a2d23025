//! taskplan CLI - Calendar-aware scheduler for Taskwarrior
//!
//! Reads the task export and the configured time maps, subtracts iCalendar
//! busy time, allocates the backlog over the horizon, and writes per-task
//! scheduling annotations back to the database.

mod ical;
mod install;
mod report;
mod taskwarrior;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Days;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use taskplan_config::{Algorithm as ConfigAlgorithm, Config};
use taskplan_solver::{Algorithm, Clock, Plan, PlanOptions, UrgencyWeights};

#[derive(Parser)]
#[command(name = "taskplan")]
#[command(author, version, about = "Calendar-aware scheduler for Taskwarrior", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Install the UDA definitions and default urgency coefficients into
    /// the taskrc
    #[arg(short, long)]
    install: bool,

    /// Schedule pending tasks across the configured horizon
    #[arg(short, long)]
    schedule: bool,

    /// Render a per-day report up to a Taskwarrior date expression
    /// (today, eow, friday, 1week, ...)
    #[arg(short, long, value_name = "DATE_EXPR")]
    report: Option<String>,

    /// Refresh calendar caches regardless of their expiration
    #[arg(short, long)]
    force_update: bool,

    /// Alternate taskrc for every Taskwarrior invocation
    #[arg(long, value_name = "PATH")]
    taskrc: Option<PathBuf>,

    /// Override the configured weight_urgency; weight_due_date becomes its
    /// complement
    #[arg(long, value_name = "WEIGHT")]
    urgency_weight: Option<f64>,

    /// Compute the schedule and print it without modifying any task
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; -v raises the default filter to debug
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    if cli.install {
        return install::run(cli.taskrc.as_deref());
    }
    if !cli.schedule && cli.report.is_none() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    let config_path = Config::default_path()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("cannot load configuration from '{}'", config_path.display()))?;

    if cli.schedule {
        cmd_schedule(&cli, &config)?;
    }
    if let Some(expr) = cli.report.as_deref() {
        report::render(&config.report, expr, cli.taskrc.as_deref())?;
    }
    Ok(())
}

/// Schedule command: snapshot, solve, write back (or print on --dry-run).
fn cmd_schedule(cli: &Cli, config: &Config) -> Result<()> {
    let taskrc = cli.taskrc.as_deref();

    let tasks = taskwarrior::export(taskrc)?;
    let coefficients = taskwarrior::urgency_coefficients(taskrc)?;
    let time_maps = config.time_maps()?;
    debug!("{} tasks in snapshot, {} time maps", tasks.len(), time_maps.len());

    let clock = Clock::now();
    let horizon_end = clock.today + Days::new(config.scheduler.days_ahead as u64);
    let calendars = ical::load_calendars(
        &config.calendars,
        (clock.today, horizon_end),
        cli.force_update,
    )?;

    let weights = match cli.urgency_weight {
        Some(weight) => UrgencyWeights { urgency: weight, due: 1.0 - weight },
        None => UrgencyWeights {
            urgency: config.scheduler.weight_urgency,
            due: config.scheduler.weight_due_date,
        },
    };
    let options = PlanOptions {
        days_ahead: config.scheduler.days_ahead,
        default_block: config.scheduler.block,
        weights,
        algorithm: match config.scheduler.algorithm {
            ConfigAlgorithm::Parallel => Algorithm::Parallel,
            ConfigAlgorithm::Sequential => Algorithm::Sequential,
        },
    };

    let plan = taskplan_solver::plan(
        &tasks,
        &time_maps,
        &calendars,
        &coefficients,
        &options,
        &clock,
    )?;

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        apply(taskrc, &plan)?;
    }

    for scheduled in plan.infeasible() {
        eprintln!(
            "{}",
            format!(
                "task {} ({}) cannot finish before its due date; best effort ends {}",
                scheduled.id, scheduled.description, scheduled.end_date
            )
            .red()
            .bold()
        );
    }
    Ok(())
}

fn apply(taskrc: Option<&std::path::Path>, plan: &Plan) -> Result<()> {
    for scheduled in &plan.tasks {
        taskwarrior::write_schedule(taskrc, scheduled)?;
        info!(
            "task {} scheduled {} to {}",
            scheduled.id, scheduled.start_date, scheduled.end_date
        );
    }
    Ok(())
}
