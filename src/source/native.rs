use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{SourceKind, StepIncrement};
use crate::sensors::{Pedometer, Subscription, SubscriptionHandle};

use super::{IncrementSink, StepSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Converts cumulative native counts into non-negative increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeIncrementTracker {
    last_count: u32,
}

impl NativeIncrementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A count lower than the previous one (counter restart) yields zero and
    /// becomes the new baseline.
    pub fn observe(&mut self, count: u32) -> u32 {
        let increment = count.saturating_sub(self.last_count);
        self.last_count = count;
        increment
    }

    pub fn last_count(&self) -> u32 {
        self.last_count
    }
}

pub struct NativeStepSource {
    pedometer: Arc<dyn Pedometer>,
    subscription: Option<SubscriptionHandle>,
}

impl NativeStepSource {
    pub fn new(pedometer: Arc<dyn Pedometer>) -> Self {
        Self {
            pedometer,
            subscription: None,
        }
    }
}

impl StepSource for NativeStepSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Native
    }

    /// Native counts are relative to the watch, so `initial_steps` only seeds
    /// the log line.
    fn start(&mut self, initial_steps: u32, sink: IncrementSink) -> Result<()> {
        self.stop();

        let subscription = self
            .pedometer
            .watch_step_count()
            .context("failed to watch native step counter")?;
        self.subscription = Some(subscription.handle());
        tokio::spawn(watch_loop(subscription, sink));

        log_info!("Native pedometer tracking started at {} steps", initial_steps);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.remove();
            log_info!("Native pedometer tracking stopped");
        }
    }

    fn reset(&mut self, _count: u32) {}

    fn is_active(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|handle| !handle.is_removed())
            .unwrap_or(false)
    }
}

async fn watch_loop(mut counts: Subscription<u32>, sink: IncrementSink) {
    let mut tracker = NativeIncrementTracker::new();
    while let Some(count) = counts.recv().await {
        let steps = tracker.observe(count);
        log_debug!("Native pedometer update: {} steps (+{})", count, steps);
        if steps == 0 {
            continue;
        }
        if sink
            .send(StepIncrement {
                steps,
                source: SourceKind::Native,
            })
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::ScriptedPedometer;
    use tokio::sync::mpsc;

    #[test]
    fn cumulative_counts_become_increments() {
        let mut tracker = NativeIncrementTracker::new();
        let increments: Vec<u32> = [100, 140, 140, 200]
            .iter()
            .map(|&count| tracker.observe(count))
            .collect();
        assert_eq!(increments, vec![100, 40, 0, 60]);
    }

    #[test]
    fn counter_restart_never_goes_negative() {
        let mut tracker = NativeIncrementTracker::new();
        tracker.observe(300);
        assert_eq!(tracker.observe(20), 0);
        assert_eq!(tracker.last_count(), 20);
        assert_eq!(tracker.observe(35), 15);
    }

    #[tokio::test]
    async fn forwards_only_positive_increments() {
        let pedometer = Arc::new(ScriptedPedometer::new(true));
        let mut source = NativeStepSource::new(pedometer.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        source.start(0, tx).unwrap();
        for count in [100, 140, 140, 200] {
            pedometer.push_count(count);
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap().steps);
        }
        assert_eq!(received, vec![100, 40, 60]);

        source.stop();
        assert!(!source.is_active());
        assert_eq!(pedometer.watcher_count(), 0);
    }

    #[tokio::test]
    async fn start_fails_without_native_counter() {
        let pedometer = Arc::new(ScriptedPedometer::new(false));
        let mut source = NativeStepSource::new(pedometer);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(source.start(0, tx).is_err());
        assert!(!source.is_active());
    }
}
