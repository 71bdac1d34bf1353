use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub status: TrackingStatus,
    pub daily_steps: u32,
    pub native_available: bool,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Local calendar day `daily_steps` belongs to.
    pub tracking_day: Option<NaiveDate>,
    /// Reason the last start attempt failed.
    pub error: Option<String>,
    /// Bumped on every activation so increments from an earlier session are
    /// recognised and dropped.
    #[serde(skip)]
    pub generation: u64,
}

/// Result of applying one increment to the running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedIncrement {
    pub daily_steps: u32,
    pub rolled_over: bool,
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_starting(&mut self) {
        self.status = TrackingStatus::Starting;
        self.error = None;
    }

    pub fn activate(
        &mut self,
        session_id: String,
        initial_steps: u32,
        native_available: bool,
        started_at: DateTime<Utc>,
        today: NaiveDate,
    ) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.status = TrackingStatus::Active;
        self.daily_steps = initial_steps;
        self.native_available = native_available;
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
        self.tracking_day = Some(today);
        self.error = None;
        self.generation
    }

    pub fn fail(&mut self, reason: String) {
        self.status = TrackingStatus::Idle;
        self.session_id = None;
        self.started_at = None;
        self.error = Some(reason);
    }

    pub fn begin_stopping(&mut self) {
        self.status = TrackingStatus::Stopping;
    }

    pub fn finish(&mut self) {
        self.status = TrackingStatus::Idle;
        self.session_id = None;
        self.started_at = None;
    }

    pub fn accepts(&self, generation: u64) -> bool {
        self.status == TrackingStatus::Active && self.generation == generation
    }

    /// Zeroes the total when `today` is not the day it was counted on.
    /// Returns whether it did.
    pub fn roll_to(&mut self, today: NaiveDate) -> bool {
        match self.tracking_day {
            Some(day) if day != today => {
                self.daily_steps = 0;
                self.tracking_day = Some(today);
                true
            }
            _ => false,
        }
    }

    /// Adds `steps` to today's total, rolling over to `today` first.
    pub fn apply_increment(&mut self, steps: u32, today: NaiveDate) -> AppliedIncrement {
        let rolled_over = self.roll_to(today);
        self.tracking_day = Some(today);
        self.daily_steps = self.daily_steps.saturating_add(steps);
        AppliedIncrement {
            daily_steps: self.daily_steps,
            rolled_over,
        }
    }

    pub fn reset_steps(&mut self) {
        self.daily_steps = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() + Duration::days(offset)
    }

    #[test]
    fn increments_accumulate_within_a_day() {
        let mut state = TrackingState::new();
        state.activate("s".into(), 10, false, Utc::now(), day(0));

        state.apply_increment(1, day(0));
        let applied = state.apply_increment(4, day(0));

        assert_eq!(applied.daily_steps, 15);
        assert!(!applied.rolled_over);
    }

    #[test]
    fn crossing_midnight_restarts_the_count() {
        let mut state = TrackingState::new();
        state.activate("s".into(), 900, false, Utc::now(), day(0));

        let applied = state.apply_increment(3, day(1));

        assert!(applied.rolled_over);
        assert_eq!(applied.daily_steps, 3);
        assert_eq!(state.tracking_day, Some(day(1)));
    }

    #[test]
    fn roll_to_zeroes_only_a_previous_day() {
        let mut state = TrackingState::new();
        assert!(!state.roll_to(day(0)));

        state.activate("s".into(), 500, false, Utc::now(), day(0));
        assert!(!state.roll_to(day(0)));
        assert_eq!(state.daily_steps, 500);

        assert!(state.roll_to(day(1)));
        assert_eq!(state.daily_steps, 0);
        assert_eq!(state.tracking_day, Some(day(1)));
        assert!(!state.roll_to(day(1)));
    }

    #[test]
    fn stale_generation_is_rejected() {
        let mut state = TrackingState::new();
        let first = state.activate("a".into(), 0, false, Utc::now(), day(0));
        state.finish();
        assert!(!state.accepts(first));

        let second = state.activate("b".into(), 0, false, Utc::now(), day(0));
        assert!(!state.accepts(first));
        assert!(state.accepts(second));
    }

    #[test]
    fn failed_start_returns_to_idle_with_reason() {
        let mut state = TrackingState::new();
        state.begin_starting();
        state.fail("permission denied".into());

        assert_eq!(state.status, TrackingStatus::Idle);
        assert_eq!(state.error.as_deref(), Some("permission denied"));
    }
}
