//! # taskplan-solver
//!
//! Availability computation and the urgency-driven allocators.
//!
//! This crate provides:
//! - Net-availability evaluation of time maps against blocking calendars
//! - Memoized long-range horizons (one availability vector per time-map set)
//! - The delta-maintained urgency model
//! - The parallel (re-sort after every block) and sequential (fill to
//!   completion) allocators
//! - The schedule result handed back to the Taskwarrior side
//!
//! The whole solve is a pure function of `(tasks, calendars, time maps,
//! clock, coefficients, options)`: candidate ordering ties break on uuid,
//! every iterated map is ordered, and the wall clock enters only through
//! [`Clock`].
//!
//! ## Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use chrono::{NaiveDate, Weekday};
//! use taskplan_core::{ClockRange, Task, TimeMap, UrgencyCoefficients};
//! use taskplan_solver::{plan, Clock, PlanOptions};
//!
//! let mut work = TimeMap::new();
//! work.windows_mut(Weekday::Mon).push(ClockRange::new(9.0, 17.0));
//! let time_maps = BTreeMap::from([("work".to_string(), work)]);
//!
//! let task = Task {
//!     uuid: "a-1".into(),
//!     estimated: Some("P0DT4H".parse().unwrap()),
//!     time_map: Some("work".into()),
//!     ..Task::default()
//! };
//!
//! let clock = Clock {
//!     today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     hour_of_day: 0.0,
//! };
//! let plan = plan(
//!     &[task],
//!     &time_maps,
//!     &[],
//!     &UrgencyCoefficients::default(),
//!     &PlanOptions::default(),
//!     &clock,
//! )
//! .unwrap();
//! assert_eq!(plan.tasks.len(), 1);
//! ```

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, Timelike};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use taskplan_core::{
    CalendarEvent, Task, TaskUuid, TimeMap, UrgencyCoefficients, MIN_ALLOCATION_HOURS,
};

pub mod availability;
pub mod horizon;
pub mod urgency;

mod parallel;
mod sequential;

pub use availability::available_hours;
pub use horizon::{Horizon, HorizonCache};
pub use urgency::{age_urgency, due_urgency, estimated_urgency, Urgency, UrgencyWeights};

/// Solver error
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("a task references unknown time map '{name}'")]
    UnknownTimeMap { name: String },
}

/// Allocation strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Algorithm {
    /// Day-by-day greedy allocation, urgencies recomputed and candidates
    /// re-sorted after every block
    #[default]
    Parallel,
    /// Strict urgency order, each task filled to completion before the next
    Sequential,
}

/// Scheduling parameters
#[derive(Clone, Copy, Debug)]
pub struct PlanOptions {
    /// Horizon length in days
    pub days_ahead: usize,
    /// Per-day allocation cap for tasks without a `min_block` of their own
    pub default_block: f64,
    pub weights: UrgencyWeights,
    pub algorithm: Algorithm,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            days_ahead: 14,
            default_block: 2.0,
            weights: UrgencyWeights::default(),
            algorithm: Algorithm::Parallel,
        }
    }
}

/// The scheduler's view of "now": today's date plus the fractional hour of
/// day. Passed in rather than read, so a run is reproducible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Clock {
    pub today: NaiveDate,
    pub hour_of_day: f64,
}

impl Clock {
    /// The local wall clock.
    pub fn now() -> Self {
        let now = chrono::Local::now();
        Self {
            today: now.date_naive(),
            hour_of_day: f64::from(now.hour())
                + f64::from(now.minute()) / 60.0
                + f64::from(now.second()) / 3600.0,
        }
    }

    /// Midnight of `today`; mostly for tests.
    pub fn start_of(today: NaiveDate) -> Self {
        Self { today, hour_of_day: 0.0 }
    }
}

// ============================================================================
// Result types
// ============================================================================

/// One task's computed schedule.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub uuid: TaskUuid,
    pub id: u64,
    pub description: String,
    /// First date receiving an allocation
    pub start_date: NaiveDate,
    /// Last date receiving an allocation
    pub end_date: NaiveDate,
    /// Human-readable note: one `"{date}: {hours:.2} hours"` line per day
    pub note: String,
    /// The end date falls after the task's due date
    pub past_due: bool,
    /// Estimated hours that did not fit inside the horizon
    pub unallocated_hours: f64,
    /// Allocated hours per date
    pub allocations: BTreeMap<NaiveDate, f64>,
}

/// Result of one allocator run: every task that received any time, in
/// (id, uuid) order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Plan {
    pub tasks: Vec<ScheduledTask>,
}

impl Plan {
    /// Tasks whose best-effort schedule finishes after their due date.
    pub fn infeasible(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.tasks.iter().filter(|t| t.past_due)
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Schedule `tasks` over the horizon and return the allocation plan.
///
/// Tasks that are not active, or that lack `estimated` or `time_map`, are
/// skipped. A task naming a time map absent from `time_maps` aborts the run.
pub fn plan(
    tasks: &[Task],
    time_maps: &BTreeMap<String, TimeMap>,
    calendars: &[Vec<CalendarEvent>],
    coefficients: &UrgencyCoefficients,
    options: &PlanOptions,
    clock: &Clock,
) -> Result<Plan, SolveError> {
    let mut states = initialize(tasks, time_maps, calendars, coefficients, options, clock)?;

    for day in 0..options.days_ahead {
        let date = clock.today + Days::new(day as u64);
        match options.algorithm {
            Algorithm::Parallel => parallel::allocate_day(&mut states, day, date, coefficients),
            Algorithm::Sequential => sequential::allocate_day(&mut states, day, date, coefficients),
        }
    }

    Ok(finalize(states))
}

// ============================================================================
// Shared allocator state
// ============================================================================

/// Live allocation state for one schedulable task.
pub(crate) struct TaskState {
    pub task: Task,
    /// Estimated hours still to place; reaches 0 when fully scheduled
    pub remaining_hours: f64,
    /// Mutable per-day budget, initialized from the horizon
    pub day_budget: Vec<f64>,
    /// Hours of today's windows already behind the wall clock
    pub today_used: f64,
    /// Hours allocated per date; keys materialize on first allocation
    pub scheduling: BTreeMap<NaiveDate, f64>,
    pub urgency: Urgency,
    /// Ceiling on a single day's allocation (historical name)
    pub min_block: f64,
    /// Sequential variant: the task has received its first allocation
    pub started: bool,
}

impl TaskState {
    /// Budget left on `day`, with day 0 reduced by the consumed part of
    /// today.
    pub(crate) fn capacity_on(&self, day: usize) -> f64 {
        let budget = self.day_budget[day];
        if day == 0 {
            budget - self.today_used
        } else {
            budget
        }
    }

    /// Book `hours` on `date`, shrinking the remaining effort and the day's
    /// budget together.
    pub(crate) fn record(&mut self, day: usize, date: NaiveDate, hours: f64) {
        self.remaining_hours = (self.remaining_hours - hours).max(0.0);
        self.day_budget[day] = (self.day_budget[day] - hours).max(0.0);
        *self.scheduling.entry(date).or_insert(0.0) += hours;
        self.started = true;
    }
}

pub(crate) fn initialize(
    tasks: &[Task],
    time_maps: &BTreeMap<String, TimeMap>,
    calendars: &[Vec<CalendarEvent>],
    coefficients: &UrgencyCoefficients,
    options: &PlanOptions,
    clock: &Clock,
) -> Result<BTreeMap<TaskUuid, TaskState>, SolveError> {
    let mut cache = HorizonCache::new();
    let mut states = BTreeMap::new();

    for task in tasks {
        if !task.status.is_active() {
            continue;
        }
        let (Some(estimated), Some(_)) = (task.estimated, task.time_map.as_ref()) else {
            debug!("skipping task {} without estimate or time map", task.uuid);
            continue;
        };
        let names = task.time_map_names();
        let horizon =
            cache.long_range(time_maps, &names, options.days_ahead, calendars, clock)?;

        let estimated_hours = estimated.as_hours();
        let urgency = Urgency::new(
            task.urgency,
            estimated_urgency(estimated_hours, coefficients),
            age_urgency(task.entry, clock.today, coefficients),
            due_urgency(task.due, clock.today, coefficients),
            options.weights,
        );

        states.insert(
            task.uuid.clone(),
            TaskState {
                remaining_hours: estimated_hours,
                day_budget: horizon.daily_hours,
                today_used: horizon.today_used,
                scheduling: BTreeMap::new(),
                urgency,
                min_block: task.min_block.unwrap_or(options.default_block),
                started: false,
                task: task.clone(),
            },
        );
    }

    Ok(states)
}

/// Day budget: the best-covered hour window over all tasks, not a shared
/// pool. Tasks with disjoint time maps do not inflate capacity.
pub(crate) fn day_capacity(states: &BTreeMap<TaskUuid, TaskState>, day: usize) -> f64 {
    states
        .values()
        .map(|state| state.capacity_on(day))
        .reduce(f64::max)
        .unwrap_or(0.0)
}

/// Candidates for `day`: remaining work, remaining day budget, wait date
/// reached, and no dependency that still has remaining work. Re-evaluated on
/// every inner iteration so a dependency completed mid-day unmasks its
/// dependent the same day.
pub(crate) fn eligible_candidates(
    states: &BTreeMap<TaskUuid, TaskState>,
    day: usize,
    date: NaiveDate,
) -> Vec<TaskUuid> {
    states
        .iter()
        .filter(|(_, state)| {
            state.remaining_hours > MIN_ALLOCATION_HOURS
                && state.day_budget[day] > MIN_ALLOCATION_HOURS
        })
        .filter(|(_, state)| state.task.wait.map_or(true, |wait| wait.date() <= date))
        .filter(|(_, state)| {
            !state.task.depends.iter().any(|dep| {
                states
                    .get(dep)
                    .is_some_and(|d| d.remaining_hours > MIN_ALLOCATION_HOURS)
            })
        })
        .map(|(uuid, _)| uuid.clone())
        .collect()
}

/// Refresh the three live urgency components for every candidate. The cached
/// totals move only by the weighted deltas.
pub(crate) fn recompute_urgencies(
    states: &mut BTreeMap<TaskUuid, TaskState>,
    candidates: &[TaskUuid],
    date: NaiveDate,
    coefficients: &UrgencyCoefficients,
) {
    for uuid in candidates {
        if let Some(state) = states.get_mut(uuid) {
            state
                .urgency
                .set_estimated(estimated_urgency(state.remaining_hours, coefficients));
            state.urgency.set_age(age_urgency(state.task.entry, date, coefficients));
            state.urgency.set_due(due_urgency(state.task.due, date, coefficients));
            debug_assert!(
                (state.urgency.total() - state.urgency.recomputed_total()).abs() < 1e-6,
                "delta-maintained urgency diverged from recomputation"
            );
        }
    }
}

/// Sort candidates most-urgent first; ties break on uuid for determinism.
pub(crate) fn sort_by_urgency(
    candidates: &mut [TaskUuid],
    states: &BTreeMap<TaskUuid, TaskState>,
) {
    candidates.sort_by(|a, b| {
        states[b]
            .urgency
            .total()
            .partial_cmp(&states[a].urgency.total())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
}

/// Allocations of one minute or less are noise, not work.
pub(crate) fn is_meaningful(hours: f64) -> bool {
    hours * 60.0 > 1.0
}

fn finalize(states: BTreeMap<TaskUuid, TaskState>) -> Plan {
    let mut tasks: Vec<ScheduledTask> = states
        .into_iter()
        .filter_map(|(uuid, state)| {
            let (&start_date, _) = state.scheduling.first_key_value()?;
            let (&end_date, _) = state.scheduling.last_key_value()?;
            let note = state
                .scheduling
                .iter()
                .map(|(date, hours)| format!("{date}: {hours:.2} hours"))
                .collect::<Vec<_>>()
                .join("\n");
            let past_due = state.task.due.is_some_and(|due| end_date > due.date());
            Some(ScheduledTask {
                uuid,
                id: state.task.id,
                description: state.task.description.clone(),
                start_date,
                end_date,
                note,
                past_due,
                unallocated_hours: state.remaining_hours,
                allocations: state.scheduling,
            })
        })
        .collect();

    tasks.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.uuid.cmp(&b.uuid)));
    Plan { tasks }
}
