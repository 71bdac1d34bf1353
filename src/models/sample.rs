//! Transient sensor and step data passed between the detector, the step
//! sources and the tracking controller. Nothing here is persisted.

use serde::{Deserialize, Serialize};

/// One 3-axis accelerometer reading, gravity-normalised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A detected step. `count` is always 1 for the peak detector but the type
/// allows batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub count: u32,
    /// Detector total after this event was applied.
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Software,
    Native,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Software => "software",
            SourceKind::Native => "native",
        }
    }
}

/// A positive step delta flowing from a step source to the tracking controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIncrement {
    pub steps: u32,
    pub source: SourceKind,
}
