//! In-process sensors driven by the caller. Used by the demo binary and by
//! tests; they honour the same subscription contract as a platform bridge.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};

use crate::models::AccelerationSample;

use super::{subscription_channel, Accelerometer, Pedometer, Subscription, SubscriptionSender};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct ScriptedAccelerometer {
    subscribers: Mutex<Vec<SubscriptionSender<AccelerationSample>>>,
    interval_ms: AtomicU64,
    permission_denied: AtomicBool,
}

impl ScriptedAccelerometer {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            interval_ms: AtomicU64::new(0),
            permission_denied: AtomicBool::new(false),
        }
    }

    pub fn deny_permission(&self, denied: bool) {
        self.permission_denied.store(denied, Ordering::SeqCst);
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    /// Delivers one sample to every live subscriber; returns how many got it.
    pub fn push(&self, sample: AccelerationSample) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|sender| sender.is_live());
        subscribers
            .iter()
            .filter(|sender| sender.send(sample))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|sender| sender.is_live());
        subscribers.len()
    }

    /// Pushes `samples` paced by the configured update interval.
    pub async fn play(&self, samples: &[AccelerationSample]) {
        let pace = self.update_interval();
        for sample in samples {
            self.push(*sample);
            tokio::time::sleep(pace).await;
        }
    }
}

impl Default for ScriptedAccelerometer {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerometer for ScriptedAccelerometer {
    fn set_update_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
    }

    fn subscribe(&self) -> Result<Subscription<AccelerationSample>> {
        if self.permission_denied.load(Ordering::SeqCst) {
            bail!("accelerometer permission denied");
        }
        let (sender, subscription) = subscription_channel();
        lock(&self.subscribers).push(sender);
        Ok(subscription)
    }
}

pub struct ScriptedPedometer {
    available: AtomicBool,
    availability_error: Mutex<Option<String>>,
    availability_checks: AtomicUsize,
    watch_error: Mutex<Option<String>>,
    history: Mutex<HashMap<NaiveDate, u32>>,
    failing_days: Mutex<HashSet<NaiveDate>>,
    watchers: Mutex<Vec<SubscriptionSender<u32>>>,
}

impl ScriptedPedometer {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            availability_error: Mutex::new(None),
            availability_checks: AtomicUsize::new(0),
            watch_error: Mutex::new(None),
            history: Mutex::new(HashMap::new()),
            failing_days: Mutex::new(HashSet::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_availability(&self, reason: impl Into<String>) {
        *lock(&self.availability_error) = Some(reason.into());
    }

    /// Makes `watch_step_count` fail while `is_available` keeps answering.
    pub fn fail_watch(&self, reason: impl Into<String>) {
        *lock(&self.watch_error) = Some(reason.into());
    }

    /// How many times `is_available` has been asked.
    pub fn availability_checks(&self) -> usize {
        self.availability_checks.load(Ordering::SeqCst)
    }

    pub fn set_day(&self, date: NaiveDate, steps: u32) {
        lock(&self.history).insert(date, steps);
    }

    pub fn fail_day(&self, date: NaiveDate) {
        lock(&self.failing_days).insert(date);
    }

    /// Reports a cumulative count to every watcher.
    pub fn push_count(&self, cumulative: u32) -> usize {
        let mut watchers = lock(&self.watchers);
        watchers.retain(|sender| sender.is_live());
        watchers
            .iter()
            .filter(|sender| sender.send(cumulative))
            .count()
    }

    pub fn watcher_count(&self) -> usize {
        let mut watchers = lock(&self.watchers);
        watchers.retain(|sender| sender.is_live());
        watchers.len()
    }
}

#[async_trait]
impl Pedometer for ScriptedPedometer {
    async fn is_available(&self) -> Result<bool> {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = lock(&self.availability_error).clone() {
            return Err(anyhow!(reason));
        }
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn get_step_count(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<u32> {
        if end < start {
            bail!("invalid range {start} .. {end}");
        }
        let date = start.date_naive();
        if lock(&self.failing_days).contains(&date) {
            bail!("no pedometer data for {date}");
        }
        Ok(lock(&self.history).get(&date).copied().unwrap_or(0))
    }

    fn watch_step_count(&self) -> Result<Subscription<u32>> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("pedometer not available");
        }
        if let Some(reason) = lock(&self.watch_error).clone() {
            return Err(anyhow!(reason));
        }
        let (sender, subscription) = subscription_channel();
        lock(&self.watchers).push(sender);
        Ok(subscription)
    }
}

/// Accelerometer trace of a steady walk: one 1 s stride cycle per five
/// samples, peaking at 1.45 g.
pub fn synthetic_walk(samples: usize) -> Vec<AccelerationSample> {
    const CYCLE: [f64; 5] = [0.95, 1.05, 1.45, 1.25, 1.0];
    (0..samples)
        .map(|i| {
            let magnitude = CYCLE[i % CYCLE.len()];
            AccelerationSample::new(0.05, 0.1, magnitude)
        })
        .collect()
}
