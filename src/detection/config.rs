use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum acceleration magnitude (gravity-normalised) for a sample to count
/// as a step peak.
pub const STEP_THRESHOLD: f64 = 1.2;

/// Refractory window between two accepted steps. Deliberately long; walking
/// cadence is faster than this, so brisk walking is undercounted.
pub const STEP_DELAY_MS: u64 = 1500;

/// Accelerometer update interval requested from the platform.
pub const SAMPLE_INTERVAL_MS: u64 = 200;

/// Tunable thresholds for the peak detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    pub step_threshold: f64,
    pub step_delay_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            step_threshold: STEP_THRESHOLD,
            step_delay_ms: STEP_DELAY_MS,
            sample_interval_ms: SAMPLE_INTERVAL_MS,
        }
    }
}

impl DetectorConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
