//! The parallel allocator: greedy day-by-day allocation with urgency
//! recomputation after every block.
//!
//! Each day opens with a budget equal to the best-covered task's remaining
//! hours for that day. The inner loop repeatedly recomputes urgencies, sorts,
//! and hands the top candidate one block bounded by its remaining effort, its
//! own day budget, the day's budget, and its block cap. The re-sort after
//! every block is the point: allocating shrinks a task's estimated-urgency
//! component, so another task may overtake it on the next pick and the day
//! ends up interleaved rather than first-come-first-served.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use taskplan_core::{TaskUuid, UrgencyCoefficients, MIN_ALLOCATION_HOURS};

use crate::{
    day_capacity, eligible_candidates, is_meaningful, recompute_urgencies, sort_by_urgency,
    TaskState,
};

/// Allocate one day's budget across the candidates.
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

        let mut allocated = false;
        for uuid in &candidates {
            let allocation = {
                let state = &states[uuid];
                state
                    .remaining_hours
                    .min(state.day_budget[day])
                    .min(day_remaining)
                    .min(state.min_block)
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
            // Back to recompute-and-sort: the pick order may have changed
            break;
        }
        if !allocated {
            break;
        }
    }

    if day_remaining > MIN_ALLOCATION_HOURS {
        debug!("{date}: unused time {day_remaining:.2}h");
    }
}
