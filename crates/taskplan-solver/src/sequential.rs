//! The sequential allocator: same skeleton as the parallel one, degenerated
//! to fill each task to completion before the next.
//!
//! Two differences from `parallel`: a task that has already received time
//! keeps the day's attention until it is done or out of budget (instead of
//! re-ranking after every block), and blocks are not capped — the selected
//! task takes everything the day can give it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use taskplan_core::{TaskUuid, UrgencyCoefficients, MIN_ALLOCATION_HOURS};

use crate::{
    day_capacity, eligible_candidates, is_meaningful, recompute_urgencies, sort_by_urgency,
    TaskState,
};

/// Allocate one day's budget, sticking with the in-flight task.
pub(crate) fn allocate_day(
    states: &mut BTreeMap<TaskUuid, TaskState>,
    day: usize,
    date: NaiveDate,
    coefficients: &UrgencyCoefficients,
) {
    let capacity = day_capacity(states, day);
    debug!("{date}: total available hours {capacity:.2}");
    if capacity <= 0.0 {
        return;
    }

    let mut day_remaining = capacity;
    while day_remaining > MIN_ALLOCATION_HOURS {
        let mut candidates = eligible_candidates(states, day, date);
        if candidates.is_empty() {
            break;
        }
        recompute_urgencies(states, &candidates, date, coefficients);
        sort_by_urgency(&mut candidates, states);
        // An in-flight task outranks everything until it completes
        candidates.sort_by_key(|uuid| !states[uuid].started);

        let mut allocated = false;
        for uuid in &candidates {
            let allocation = {
                let state = &states[uuid];
                state.remaining_hours.min(state.day_budget[day]).min(day_remaining)
            };
            if !is_meaningful(allocation) {
                continue;
            }
            if let Some(state) = states.get_mut(uuid) {
                state.record(day, date, allocation);
                debug!("{date}: allocated {allocation:.2}h to {uuid}");
            }
            day_remaining -= allocation;
            allocated = true;
            break;
        }
        if !allocated {
            break;
        }
    }
}
