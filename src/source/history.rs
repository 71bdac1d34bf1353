use std::ops::RangeInclusive;

use rand::Rng;

/// Floor applied to the live count before estimating a missing day.
pub const ESTIMATE_FLOOR_STEPS: u32 = 5000;

/// Jitter applied to estimated native history.
pub const ESTIMATE_JITTER: RangeInclusive<f64> = 0.7..=1.3;

/// Approximation for a day the native counter could not report. Not a
/// measurement.
pub fn estimate_day_steps<R: Rng + ?Sized>(current_steps: u32, rng: &mut R) -> u32 {
    let base = current_steps.max(ESTIMATE_FLOOR_STEPS) as f64;
    (base * rng.gen_range(ESTIMATE_JITTER)).round() as u32
}
