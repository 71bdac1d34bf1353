use std::sync::Arc;

use anyhow::Result;
use log::error;

use crate::detection::{DetectorConfig, StepCallbacks, StepDetector};
use crate::models::{SourceKind, StepIncrement};
use crate::sensors::Accelerometer;

use super::{IncrementSink, StepSource};

pub struct SoftwareStepSource {
    accelerometer: Arc<dyn Accelerometer>,
    config: DetectorConfig,
    detector: Option<StepDetector>,
}

impl SoftwareStepSource {
    pub fn new(accelerometer: Arc<dyn Accelerometer>, config: DetectorConfig) -> Self {
        Self {
            accelerometer,
            config,
            detector: None,
        }
    }

    pub fn step_count(&self) -> Option<u32> {
        self.detector.as_ref().map(StepDetector::step_count)
    }
}

impl StepSource for SoftwareStepSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Software
    }

    fn start(&mut self, initial_steps: u32, sink: IncrementSink) -> Result<()> {
        self.stop();

        let callbacks = StepCallbacks {
            on_step_detected: Box::new(move |steps| {
                let _ = sink.send(StepIncrement {
                    steps,
                    source: SourceKind::Software,
                });
            }),
            on_error: Box::new(|err| error!("Software step source error: {err:#}")),
        };

        let mut detector =
            StepDetector::new(Arc::clone(&self.accelerometer), self.config.clone(), callbacks);
        detector.start_monitoring(initial_steps)?;
        self.detector = Some(detector);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut detector) = self.detector.take() {
            detector.stop_monitoring();
        }
    }

    fn reset(&mut self, count: u32) {
        if let Some(detector) = &self.detector {
            detector.reset_step_count(count);
        }
    }

    fn is_active(&self) -> bool {
        self.detector
            .as_ref()
            .map(StepDetector::is_active)
            .unwrap_or(false)
    }
}
