//! Dashboard calorie figure fed by daily step totals.

use serde::{Deserialize, Serialize};

pub const CALORIES_PER_STEP: f64 = 0.04;

/// Credits calories only for positive step deltas, so replaying a total or
/// receiving a lower one (reset, rollover) never double-credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalorieModel {
    calories_per_step: f64,
    last_known_steps: u32,
    calories_burned: f64,
}

impl CalorieModel {
    pub fn new(calories_per_step: f64, baseline_steps: u32) -> Self {
        Self {
            calories_per_step,
            last_known_steps: baseline_steps,
            calories_burned: 0.0,
        }
    }

    /// Returns the calories added by this update (zero if the total did not grow).
    pub fn apply(&mut self, total_steps: u32) -> f64 {
        let delta = total_steps.saturating_sub(self.last_known_steps);
        self.last_known_steps = total_steps;
        let additional = (delta as f64 * self.calories_per_step).max(0.0);
        self.calories_burned += additional;
        additional
    }

    pub fn calories_burned(&self) -> f64 {
        self.calories_burned
    }

    pub fn last_known_steps(&self) -> u32 {
        self.last_known_steps
    }
}

impl Default for CalorieModel {
    fn default() -> Self {
        Self::new(CALORIES_PER_STEP, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_total_adds_nothing() {
        let mut model = CalorieModel::default();
        let first = model.apply(100);
        let second = model.apply(100);

        assert!((first - 4.0).abs() < 1e-9);
        assert_eq!(second, 0.0);
        assert!((model.calories_burned() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn lower_total_rebases_without_credit() {
        let mut model = CalorieModel::new(CALORIES_PER_STEP, 500);
        assert_eq!(model.apply(0), 0.0);
        assert_eq!(model.last_known_steps(), 0);

        let added = model.apply(50);
        assert!((added - 2.0).abs() < 1e-9);
    }
}
