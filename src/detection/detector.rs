use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use tokio::{task::JoinHandle, time::Instant};

use crate::models::AccelerationSample;
use crate::sensors::{Accelerometer, Subscription, SubscriptionHandle};

use super::{DetectorConfig, PeakDetector};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Receivers for detector output. Both run on the sample loop and must return
/// quickly.
pub struct StepCallbacks {
    pub on_step_detected: Box<dyn Fn(u32) + Send + Sync>,
    pub on_error: Box<dyn Fn(anyhow::Error) + Send + Sync>,
}

fn lock_peak(peak: &Mutex<PeakDetector>) -> MutexGuard<'_, PeakDetector> {
    match peak.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Software step detector: owns the accelerometer subscription and feeds
/// every sample through a [`PeakDetector`].
pub struct StepDetector {
    accelerometer: Arc<dyn Accelerometer>,
    peak: Arc<Mutex<PeakDetector>>,
    callbacks: Arc<StepCallbacks>,
    subscription: Option<SubscriptionHandle>,
    worker: Option<JoinHandle<()>>,
}

impl StepDetector {
    pub fn new(
        accelerometer: Arc<dyn Accelerometer>,
        config: DetectorConfig,
        callbacks: StepCallbacks,
    ) -> Self {
        Self {
            accelerometer,
            peak: Arc::new(Mutex::new(PeakDetector::new(config))),
            callbacks: Arc::new(callbacks),
            subscription: None,
            worker: None,
        }
    }

    /// Starting an already-running detector is a no-op.
    pub fn start_monitoring(&mut self, initial_steps: u32) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let interval = lock_peak(&self.peak).config().sample_interval();
        self.accelerometer.set_update_interval(interval);
        let subscription = self
            .accelerometer
            .subscribe()
            .context("failed to subscribe to accelerometer")?;

        lock_peak(&self.peak).start(initial_steps, Instant::now());

        self.subscription = Some(subscription.handle());
        self.worker = Some(tokio::spawn(sample_loop(
            subscription,
            Arc::clone(&self.peak),
            Arc::clone(&self.callbacks),
        )));

        log_info!("Step detector started monitoring at {} steps", initial_steps);
        Ok(())
    }

    pub fn stop_monitoring(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.remove();
            log_info!("Step detector stopped monitoring");
        }
        // The loop exits on its own once the subscription is removed.
        self.worker.take();
    }

    pub fn reset_step_count(&self, count: u32) {
        lock_peak(&self.peak).reset(count);
    }

    pub fn step_count(&self) -> u32 {
        lock_peak(&self.peak).step_count()
    }

    pub fn is_active(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|handle| !handle.is_removed())
            .unwrap_or(false)
    }
}

impl Drop for StepDetector {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

async fn sample_loop(
    mut samples: Subscription<AccelerationSample>,
    peak: Arc<Mutex<PeakDetector>>,
    callbacks: Arc<StepCallbacks>,
) {
    while let Some(sample) = samples.recv().await {
        let outcome = lock_peak(&peak).process_sample(&sample, Instant::now());
        match outcome {
            Ok(Some(event)) => {
                log_debug!("Step detected, detector total {}", event.total);
                (callbacks.on_step_detected)(event.count);
            }
            Ok(None) => {}
            Err(err) => {
                log_error!("step detection error: {err:#}");
                (callbacks.on_error)(err);
            }
        }
    }
    log_debug!("accelerometer sample loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ScriptedAccelerometer;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Recorder {
        steps: Arc<AtomicU32>,
        errors: Arc<AtomicU32>,
    }

    fn recorder() -> (Recorder, StepCallbacks) {
        let steps = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(AtomicU32::new(0));
        let callbacks = StepCallbacks {
            on_step_detected: {
                let steps = Arc::clone(&steps);
                Box::new(move |count| {
                    steps.fetch_add(count, Ordering::SeqCst);
                })
            },
            on_error: {
                let errors = Arc::clone(&errors);
                Box::new(move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
            },
        };
        (Recorder { steps, errors }, callbacks)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn detects_steps_from_subscription() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let (recorder, callbacks) = recorder();
        let mut detector =
            StepDetector::new(accelerometer.clone(), DetectorConfig::default(), callbacks);

        detector.start_monitoring(10).unwrap();
        assert_eq!(accelerometer.update_interval(), Duration::from_millis(200));

        tokio::time::advance(Duration::from_millis(1600)).await;
        accelerometer.push(AccelerationSample::new(0.0, 0.0, 1.0));
        accelerometer.push(AccelerationSample::new(0.0, 0.0, 1.5));
        settle().await;

        assert_eq!(recorder.steps.load(Ordering::SeqCst), 1);
        assert_eq!(detector.step_count(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_errors_do_not_end_subscription() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let (recorder, callbacks) = recorder();
        let mut detector =
            StepDetector::new(accelerometer.clone(), DetectorConfig::default(), callbacks);
        detector.start_monitoring(0).unwrap();

        tokio::time::advance(Duration::from_millis(2000)).await;
        accelerometer.push(AccelerationSample::new(f64::NAN, 0.0, 0.0));
        accelerometer.push(AccelerationSample::new(0.0, 0.0, 1.5));
        settle().await;

        assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.steps.load(Ordering::SeqCst), 1);
        assert!(detector.is_active());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_unsubscribes() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let (_recorder, callbacks) = recorder();
        let mut detector =
            StepDetector::new(accelerometer.clone(), DetectorConfig::default(), callbacks);

        detector.start_monitoring(0).unwrap();
        assert_eq!(accelerometer.subscriber_count(), 1);

        detector.stop_monitoring();
        detector.stop_monitoring();
        assert!(!detector.is_active());
        assert_eq!(accelerometer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn start_fails_when_permission_denied() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        accelerometer.deny_permission(true);
        let (_recorder, callbacks) = recorder();
        let mut detector =
            StepDetector::new(accelerometer.clone(), DetectorConfig::default(), callbacks);

        assert!(detector.start_monitoring(0).is_err());
        assert!(!detector.is_active());
    }

    #[tokio::test]
    async fn reset_keeps_subscription() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let (_recorder, callbacks) = recorder();
        let mut detector =
            StepDetector::new(accelerometer.clone(), DetectorConfig::default(), callbacks);
        detector.start_monitoring(25).unwrap();

        detector.reset_step_count(0);

        assert_eq!(detector.step_count(), 0);
        assert!(detector.is_active());
    }
}
