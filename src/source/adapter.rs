use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use log::{info, warn};
use tokio::sync::mpsc;

use crate::detection::DetectorConfig;
use crate::models::{SourceKind, WeeklySteps, DAYS_IN_WEEK};
use crate::sensors::{Accelerometer, Pedometer};
use crate::utils::time::{day_bounds, week_dates};

use super::{
    history::estimate_day_steps, IncrementSink, IncrementStream, NativeStepSource,
    SoftwareStepSource, SourcePolicy, StepSource,
};

/// Presents one increment stream regardless of which step sources the host
/// platform supports.
pub struct PlatformStepAdapter {
    accelerometer: Arc<dyn Accelerometer>,
    pedometer: Option<Arc<dyn Pedometer>>,
    config: DetectorConfig,
    policy: SourcePolicy,
    sources: Vec<Box<dyn StepSource>>,
}

impl PlatformStepAdapter {
    pub fn new(
        accelerometer: Arc<dyn Accelerometer>,
        pedometer: Option<Arc<dyn Pedometer>>,
        config: DetectorConfig,
        policy: SourcePolicy,
    ) -> Self {
        Self {
            accelerometer,
            pedometer,
            config,
            policy,
            sources: Vec::new(),
        }
    }

    /// Never fails; any platform error reads as "not available".
    pub async fn check_availability(&self) -> bool {
        let Some(pedometer) = &self.pedometer else {
            return false;
        };
        match pedometer.is_available().await {
            Ok(available) => available,
            Err(err) => {
                warn!("Pedometer availability check failed: {err:#}");
                false
            }
        }
    }

    /// `native_available` is the caller's [`check_availability`] answer for
    /// this session.
    ///
    /// [`check_availability`]: Self::check_availability
    pub fn start(
        &mut self,
        initial_steps: u32,
        native_available: bool,
    ) -> Result<IncrementStream> {
        if !self.sources.is_empty() {
            bail!("step sources already running");
        }

        let native = if native_available {
            self.pedometer.clone()
        } else {
            info!("Native pedometer unavailable, using accelerometer detection");
            None
        };

        let (tx, rx) = mpsc::unbounded_channel();

        match (self.policy, native) {
            (SourcePolicy::PreferNativeOnly, Some(pedometer)) => {
                if let Err(err) = self.start_native(pedometer, initial_steps, tx.clone()) {
                    warn!("Native pedometer failed to start, falling back to software: {err:#}");
                    self.start_software(initial_steps, tx)?;
                }
            }
            (policy, native) => {
                self.start_software(initial_steps, tx.clone())?;
                if let (SourcePolicy::Combined, Some(pedometer)) = (policy, native) {
                    if let Err(err) = self.start_native(pedometer, initial_steps, tx) {
                        warn!("Error setting up native pedometer: {err:#}");
                    }
                }
            }
        }

        info!(
            "Step sources started ({:?}): {:?}",
            self.policy,
            self.active_sources()
        );
        Ok(rx)
    }

    fn start_software(&mut self, initial_steps: u32, sink: IncrementSink) -> Result<()> {
        let mut source =
            SoftwareStepSource::new(Arc::clone(&self.accelerometer), self.config.clone());
        source.start(initial_steps, sink)?;
        self.sources.push(Box::new(source));
        Ok(())
    }

    fn start_native(
        &mut self,
        pedometer: Arc<dyn Pedometer>,
        initial_steps: u32,
        sink: IncrementSink,
    ) -> Result<()> {
        let mut source = NativeStepSource::new(pedometer);
        source.start(initial_steps, sink)?;
        self.sources.push(Box::new(source));
        Ok(())
    }

    /// Tears down every running source. Safe to call repeatedly.
    pub fn stop(&mut self) {
        for mut source in self.sources.drain(..) {
            source.stop();
        }
    }

    pub fn reset(&mut self, count: u32) {
        for source in self.sources.iter_mut() {
            source.reset(count);
        }
    }

    pub fn is_running(&self) -> bool {
        self.sources.iter().any(|source| source.is_active())
    }

    pub fn active_sources(&self) -> Vec<SourceKind> {
        self.sources
            .iter()
            .filter(|source| source.is_active())
            .map(|source| source.kind())
            .collect()
    }

    /// Native steps since local midnight. Callers check availability first.
    pub async fn native_steps_today(&self, now: DateTime<Local>) -> Option<u32> {
        let pedometer = self.pedometer.as_ref()?;
        let (start, end) = day_bounds(now.date_naive(), now);
        match pedometer.get_step_count(start, end).await {
            Ok(steps) => Some(steps),
            Err(err) => {
                warn!("Error getting initial native step count: {err:#}");
                None
            }
        }
    }

    /// Steps in `[start, end]`, measured natively when possible, otherwise
    /// estimated from `current_steps`.
    pub async fn step_count_in_range(
        &self,
        start: DateTime<Local>,
        end: DateTime<Local>,
        current_steps: u32,
    ) -> u32 {
        if let Some(pedometer) = &self.pedometer {
            match pedometer.get_step_count(start, end).await {
                Ok(steps) => return steps,
                Err(err) => warn!(
                    "Error getting steps for {}: {err:#}",
                    start.date_naive()
                ),
            }
        }
        let estimate = estimate_day_steps(current_steps, &mut rand::thread_rng());
        info!(
            "Using estimated {} steps for {}",
            estimate,
            start.date_naive()
        );
        estimate
    }

    /// Per-day native history for the week ending at `now`; `None` when no
    /// native counter is available.
    pub async fn native_weekly_history(
        &self,
        current_steps: u32,
        now: DateTime<Local>,
    ) -> Option<WeeklySteps> {
        if !self.check_availability().await {
            return None;
        }

        let mut steps = [0u32; DAYS_IN_WEEK];
        for (slot, date) in steps.iter_mut().zip(week_dates(now.date_naive())) {
            let (start, end) = day_bounds(date, now);
            *slot = self.step_count_in_range(start, end, current_steps).await;
        }
        Some(WeeklySteps(steps))
    }
}

impl Drop for PlatformStepAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccelerationSample;
    use crate::sensors::{ScriptedAccelerometer, ScriptedPedometer};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn adapter(
        accelerometer: &Arc<ScriptedAccelerometer>,
        pedometer: Option<&Arc<ScriptedPedometer>>,
        policy: SourcePolicy,
    ) -> PlatformStepAdapter {
        PlatformStepAdapter::new(
            accelerometer.clone(),
            pedometer.map(|p| p.clone() as Arc<dyn Pedometer>),
            DetectorConfig::default(),
            policy,
        )
    }

    #[tokio::test]
    async fn availability_errors_read_as_unavailable() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        pedometer.fail_availability("sensor service crashed");

        assert!(!adapter(&accelerometer, Some(&pedometer), SourcePolicy::Combined)
            .check_availability()
            .await);
        assert!(!adapter(&accelerometer, None, SourcePolicy::Combined)
            .check_availability()
            .await);
    }

    #[tokio::test]
    async fn software_only_without_native_counter() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let mut adapter = adapter(&accelerometer, None, SourcePolicy::Combined);
        let native = adapter.check_availability().await;

        let _stream = adapter.start(0, native).unwrap();

        assert_eq!(adapter.active_sources(), vec![SourceKind::Software]);
        assert_eq!(accelerometer.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn combined_policy_runs_both_sources_without_dedup() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        let mut adapter = adapter(&accelerometer, Some(&pedometer), SourcePolicy::Combined);

        let mut stream = adapter.start(0, true).unwrap();
        assert_eq!(
            adapter.active_sources(),
            vec![SourceKind::Software, SourceKind::Native]
        );

        tokio::time::advance(Duration::from_millis(1600)).await;
        accelerometer.push(AccelerationSample::new(0.0, 0.0, 1.5));
        pedometer.push_count(1);

        let mut total = 0;
        for _ in 0..2 {
            total += stream.recv().await.unwrap().steps;
        }
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn prefer_native_only_skips_software() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        let mut adapter =
            adapter(&accelerometer, Some(&pedometer), SourcePolicy::PreferNativeOnly);

        let _stream = adapter.start(0, true).unwrap();

        assert_eq!(adapter.active_sources(), vec![SourceKind::Native]);
        assert_eq!(accelerometer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn prefer_native_only_falls_back_when_unavailable() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(false));
        let mut adapter =
            adapter(&accelerometer, Some(&pedometer), SourcePolicy::PreferNativeOnly);
        let native = adapter.check_availability().await;

        let _stream = adapter.start(0, native).unwrap();

        assert!(!native);
        assert_eq!(adapter.active_sources(), vec![SourceKind::Software]);
    }

    #[tokio::test]
    async fn prefer_native_only_falls_back_when_watch_fails() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        pedometer.fail_watch("step counting service busy");
        let mut adapter =
            adapter(&accelerometer, Some(&pedometer), SourcePolicy::PreferNativeOnly);
        let native = adapter.check_availability().await;

        let _stream = adapter.start(0, native).unwrap();

        assert!(native);
        assert_eq!(adapter.active_sources(), vec![SourceKind::Software]);
        assert_eq!(accelerometer.subscriber_count(), 1);
        assert_eq!(pedometer.watcher_count(), 0);
    }

    #[tokio::test]
    async fn combined_policy_keeps_software_when_watch_fails() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        pedometer.fail_watch("step counting service busy");
        let mut adapter = adapter(&accelerometer, Some(&pedometer), SourcePolicy::Combined);

        let _stream = adapter.start(0, true).unwrap();

        assert_eq!(adapter.active_sources(), vec![SourceKind::Software]);
    }

    #[tokio::test]
    async fn stop_tears_down_every_source() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        let mut adapter = adapter(&accelerometer, Some(&pedometer), SourcePolicy::Combined);
        let _stream = adapter.start(0, true).unwrap();

        adapter.stop();
        adapter.stop();

        assert!(!adapter.is_running());
        assert_eq!(accelerometer.subscriber_count(), 0);
        assert_eq!(pedometer.watcher_count(), 0);
    }

    #[tokio::test]
    async fn start_fails_when_software_detector_cannot_subscribe() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        accelerometer.deny_permission(true);
        let mut adapter = adapter(&accelerometer, None, SourcePolicy::Combined);

        assert!(adapter.start(0, false).is_err());
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn weekly_history_estimates_failed_days() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        let now = Local::now();
        let today = now.date_naive();
        let yesterday = today - ChronoDuration::days(1);
        pedometer.set_day(today, 4321);
        pedometer.fail_day(yesterday);

        let adapter = adapter(&accelerometer, Some(&pedometer), SourcePolicy::Combined);
        let history = adapter.native_weekly_history(6000, now).await.unwrap();

        assert_eq!(history.today(), 4321);
        let estimated = history.as_array()[5];
        assert!((4200..=7800).contains(&estimated));
        assert_eq!(history.as_array()[0], 0);
    }

    #[tokio::test]
    async fn weekly_history_needs_native_counter() {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let adapter = adapter(&accelerometer, None, SourcePolicy::Combined);
        assert!(adapter.native_weekly_history(100, Local::now()).await.is_none());
    }
}
