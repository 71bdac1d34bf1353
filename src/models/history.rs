//! Persisted step history shapes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DAYS_IN_WEEK: usize = 7;

/// Shown when no history exists at all.
pub const DEFAULT_WEEKLY_STEPS: WeeklySteps =
    WeeklySteps([5000, 6000, 5500, 7000, 6500, 8000, 7500]);

/// Rolling seven-day step totals. Index 0 is six days ago, index 6 is today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySteps(pub [u32; DAYS_IN_WEEK]);

impl WeeklySteps {
    pub fn today(&self) -> u32 {
        self.0[DAYS_IN_WEEK - 1]
    }

    pub fn with_today(mut self, steps: u32) -> Self {
        self.0[DAYS_IN_WEEK - 1] = steps;
        self
    }

    pub fn as_array(&self) -> [u32; DAYS_IN_WEEK] {
        self.0
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&steps| u64::from(steps)).sum()
    }
}

/// Backing entry for one day-of-week counter. `date` is the local calendar day
/// the count belongs to, so a slot left over from an earlier week is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySlot {
    pub date: NaiveDate,
    pub steps: u32,
}

/// Cached weekly history, valid for the day it was generated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyCache {
    pub generated_on: NaiveDate,
    pub steps: WeeklySteps,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_steps_rejects_wrong_length() {
        assert!(serde_json::from_str::<WeeklySteps>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<WeeklySteps>("[1,2,3,4,5,6,7,8]").is_err());
        let parsed: WeeklySteps = serde_json::from_str("[1,2,3,4,5,6,7]").unwrap();
        assert_eq!(parsed.today(), 7);
        assert_eq!(parsed.total(), 28);
    }

    #[test]
    fn weekly_steps_rejects_negative_entries() {
        assert!(serde_json::from_str::<WeeklySteps>("[1,2,3,4,5,6,-7]").is_err());
    }

    #[test]
    fn with_today_only_touches_last_slot() {
        let steps = DEFAULT_WEEKLY_STEPS.with_today(42);
        assert_eq!(steps.as_array(), [5000, 6000, 5500, 7000, 6500, 8000, 42]);
    }
}
