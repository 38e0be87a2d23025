//! The urgency model: an additive decomposition maintained by deltas.
//!
//! ```text
//! total = base + w_urgency * (estimated + age) + w_due * due
//! ```
//!
//! `base` bundles everything Taskwarrior already priced in (project,
//! priority, tags, active, blocking); it is derived once from the exported
//! urgency and never recomputed. The other three components shift as time is
//! allocated, and every shift adjusts the cached total by the weighted
//! difference. That delta path is the only way the total changes.

use chrono::{NaiveDate, NaiveDateTime};

use taskplan_core::UrgencyCoefficients;

/// Weight pair for the parallel allocator; `(1, 1)` reproduces plain
/// Taskwarrior-style urgency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UrgencyWeights {
    pub urgency: f64,
    pub due: f64,
}

impl Default for UrgencyWeights {
    fn default() -> Self {
        Self { urgency: 1.0, due: 1.0 }
    }
}

/// A task's urgency as live components plus the cached weighted total.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Urgency {
    base: f64,
    estimated: f64,
    age: f64,
    due: f64,
    weights: UrgencyWeights,
    total: f64,
}

impl Urgency {
    /// Split the exported total into `base` plus the modeled components,
    /// then apply weights. The components arrive unweighted; base stays
    /// unweighted by design since it bundles unrelated contributions.
    pub fn new(
        exported_total: f64,
        estimated: f64,
        age: f64,
        due: f64,
        weights: UrgencyWeights,
    ) -> Self {
        let base = exported_total - estimated - age - due;
        let total = base + weights.urgency * (estimated + age) + weights.due * due;
        Self { base, estimated, age, due, weights, total }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn estimated(&self) -> f64 {
        self.estimated
    }

    pub fn set_estimated(&mut self, value: f64) {
        self.total += self.weights.urgency * (value - self.estimated);
        self.estimated = value;
    }

    pub fn set_age(&mut self, value: f64) {
        self.total += self.weights.urgency * (value - self.age);
        self.age = value;
    }

    pub fn set_due(&mut self, value: f64) {
        self.total += self.weights.due * (value - self.due);
        self.due = value;
    }

    /// Total rebuilt from scratch; test boundaries assert it against the
    /// delta-maintained cache.
    pub fn recomputed_total(&self) -> f64 {
        self.base
            + self.weights.urgency * (self.estimated + self.age)
            + self.weights.due * self.due
    }
}

/// `coefficient * remaining_hours` for the nearest whole-hour coefficient
/// key; zero when no coefficients are configured.
pub fn estimated_urgency(remaining_hours: f64, coefficients: &UrgencyCoefficients) -> f64 {
    coefficients
        .estimated_coefficient(remaining_hours)
        .map_or(0.0, |c| c * remaining_hours)
}

/// Age component: scales linearly with days since entry, saturating at
/// `age_max` days.
pub fn age_urgency(
    entry: Option<NaiveDateTime>,
    date: NaiveDate,
    coefficients: &UrgencyCoefficients,
) -> f64 {
    let Some(entry) = entry else { return 0.0 };
    if coefficients.age_max <= 0.0 {
        return 0.0;
    }
    let days = (date - entry.date()).num_days().max(0) as f64;
    coefficients.age * (days / coefficients.age_max).min(1.0)
}

/// Due component over δ = days until due: saturated at the coefficient once
/// due (or overdue), a linear ramp down to 0.2 of it across the final week,
/// and a tail decaying toward zero beyond that. Continuous at both knees.
pub fn due_urgency(
    due: Option<NaiveDateTime>,
    date: NaiveDate,
    coefficients: &UrgencyCoefficients,
) -> f64 {
    let Some(due) = due else { return 0.0 };
    let delta = (due.date() - date).num_days() as f64;
    let c = coefficients.due;
    if delta <= 0.0 {
        c
    } else if delta <= 7.0 {
        c * (1.0 - 0.8 * delta / 7.0)
    } else {
        c * 0.2 * 7.0 / delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn coeffs() -> UrgencyCoefficients {
        let mut c = UrgencyCoefficients::default();
        c.estimated.insert("P1H".into(), 5.0);
        c.estimated.insert("P2H".into(), 8.0);
        c
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn instant(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        Some(date(y, m, d).and_hms_opt(17, 0, 0).unwrap())
    }

    #[test]
    fn base_absorbs_the_unmodeled_remainder() {
        let u = Urgency::new(10.0, 5.0, 1.0, 3.0, UrgencyWeights::default());
        assert_eq!(u.total(), 10.0);
        assert_eq!(u.recomputed_total(), 10.0);
    }

    #[test]
    fn weights_scale_components_but_not_base() {
        let weights = UrgencyWeights { urgency: 0.7, due: 0.3 };
        let u = Urgency::new(10.0, 5.0, 1.0, 3.0, weights);
        // base = 10 - 5 - 1 - 3 = 1
        let expected = 1.0 + 0.7 * (5.0 + 1.0) + 0.3 * 3.0;
        assert!((u.total() - expected).abs() < 1e-9);
    }

    #[test]
    fn delta_update_matches_full_recomputation() {
        let weights = UrgencyWeights { urgency: 0.7, due: 0.3 };
        let mut u = Urgency::new(12.5, 8.0, 0.5, 2.0, weights);
        u.set_estimated(4.0);
        u.set_due(6.0);
        u.set_age(0.75);
        u.set_estimated(2.0);
        assert!((u.total() - u.recomputed_total()).abs() < 1e-9);
    }

    #[test]
    fn estimated_urgency_is_coefficient_times_remaining() {
        assert_eq!(estimated_urgency(1.0, &coeffs()), 5.0);
        assert_eq!(estimated_urgency(2.0, &coeffs()), 16.0);
        assert_eq!(estimated_urgency(2.0, &UrgencyCoefficients::default()), 0.0);
    }

    #[test]
    fn age_urgency_scales_and_saturates() {
        let c = coeffs();
        let entry = instant(2023, 11, 20);
        // 15 days later, age.max 365, coefficient 2
        let u = age_urgency(entry, date(2023, 12, 5), &c);
        assert!((u - 2.0 * 15.0 / 365.0).abs() < 1e-9);
        // Far past age.max it pins at the coefficient
        assert_eq!(age_urgency(entry, date(2030, 1, 1), &c), 2.0);
        assert_eq!(age_urgency(None, date(2023, 12, 5), &c), 0.0);
    }

    #[test]
    fn due_urgency_saturates_when_overdue() {
        let c = coeffs();
        assert_eq!(due_urgency(instant(2023, 12, 1), date(2023, 12, 10), &c), 12.0);
        assert_eq!(due_urgency(instant(2023, 12, 10), date(2023, 12, 10), &c), 12.0);
    }

    #[test]
    fn due_urgency_ramps_inside_the_final_week() {
        let c = coeffs();
        let five_out = due_urgency(instant(2023, 12, 10), date(2023, 12, 5), &c);
        assert!(five_out > 0.0 && five_out < 12.0);
        // Monotone toward the deadline
        let four_out = due_urgency(instant(2023, 12, 10), date(2023, 12, 6), &c);
        assert!(four_out > five_out);
        // Knee at seven days: 0.2 of the coefficient
        let seven_out = due_urgency(instant(2023, 12, 10), date(2023, 12, 3), &c);
        assert!((seven_out - 2.4).abs() < 1e-9);
    }

    #[test]
    fn due_urgency_tail_decays_past_the_week() {
        let c = coeffs();
        let fourteen_out = due_urgency(instant(2023, 12, 15), date(2023, 12, 1), &c);
        assert!((fourteen_out - 2.4 * 0.5).abs() < 1e-9);
        assert_eq!(due_urgency(None, date(2023, 12, 1), &c), 0.0);
    }
}
