//! Magnitude-threshold peak detection with a refractory period.
//!
//! A sample produces a step when all of the following hold:
//! - its magnitude exceeds the configured threshold,
//! - its magnitude exceeds the previous sample's (rising edge),
//! - more than `step_delay` has passed since the last accepted step.
//!
//! The previous magnitude is updated after every valid sample, whether or not
//! a step fired.

use anyhow::{bail, Result};
use tokio::time::Instant;

use crate::models::{AccelerationSample, StepEvent};

use super::DetectorConfig;

#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: DetectorConfig,
    step_count: u32,
    last_step_at: Option<Instant>,
    previous_magnitude: f64,
}

impl PeakDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            step_count: 0,
            last_step_at: None,
            previous_magnitude: 0.0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Seeds the counter and opens a refractory window starting at `now`.
    pub fn start(&mut self, initial_count: u32, now: Instant) {
        self.step_count = initial_count;
        self.last_step_at = Some(now);
    }

    pub fn reset(&mut self, count: u32) {
        self.step_count = count;
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn previous_magnitude(&self) -> f64 {
        self.previous_magnitude
    }

    pub fn process_sample(
        &mut self,
        sample: &AccelerationSample,
        now: Instant,
    ) -> Result<Option<StepEvent>> {
        if !sample.is_finite() {
            bail!(
                "non-finite accelerometer sample ({}, {}, {})",
                sample.x,
                sample.y,
                sample.z
            );
        }

        let magnitude = sample.magnitude();
        let refractory_elapsed = self
            .last_step_at
            .map(|last| now.saturating_duration_since(last) > self.config.step_delay())
            .unwrap_or(true);

        let event = if magnitude > self.config.step_threshold
            && magnitude > self.previous_magnitude
            && refractory_elapsed
        {
            self.step_count = self.step_count.saturating_add(1);
            self.last_step_at = Some(now);
            Some(StepEvent {
                count: 1,
                total: self.step_count,
            })
        } else {
            None
        };

        self.previous_magnitude = magnitude;
        Ok(event)
    }
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
