mod history;
mod sample;

pub use history::{DaySlot, WeeklyCache, WeeklySteps, DEFAULT_WEEKLY_STEPS, DAYS_IN_WEEK};
pub use sample::{AccelerationSample, SourceKind, StepEvent, StepIncrement};
