//! Durable accounting of today's steps and the rolling week.
//!
//! Every method swallows storage failures: they are logged and read as "no
//! data", so a broken store never takes the tracking session down with it.

use std::{ops::RangeInclusive, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rand::Rng;

use crate::models::{DaySlot, WeeklyCache, WeeklySteps, DAYS_IN_WEEK, DEFAULT_WEEKLY_STEPS};
use crate::storage::KeyValueStore;
use crate::utils::time::{week_dates, weekday_slot};

use super::LedgerKeys;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Spread applied to the live count when a past day has no record.
pub const DERIVED_FACTOR: RangeInclusive<f64> = 0.9..=1.1;

pub fn derive_estimate<R: Rng + ?Sized>(current_steps: u32, rng: &mut R) -> u32 {
    (current_steps as f64 * rng.gen_range(DERIVED_FACTOR)).round() as u32
}

#[derive(Clone)]
pub struct StepLedger {
    store: Arc<dyn KeyValueStore>,
    keys: Arc<LedgerKeys>,
}

impl StepLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        Self {
            store,
            keys: Arc::new(LedgerKeys::new(prefix)),
        }
    }

    pub fn keys(&self) -> &LedgerKeys {
        &self.keys
    }

    pub async fn record_steps(&self, daily_steps: u32) {
        self.record_steps_at(daily_steps, Local::now()).await;
    }

    /// Persists the daily count, the update time and today's day-of-week slot.
    pub async fn record_steps_at(&self, daily_steps: u32, now: DateTime<Local>) {
        match self.try_record(daily_steps, now).await {
            Ok(()) => log_debug!(
                "Saved {} steps to storage for day {}",
                daily_steps,
                weekday_slot(now.date_naive())
            ),
            Err(err) => log_error!("Error saving steps to storage: {err:#}"),
        }
    }

    async fn try_record(&self, daily_steps: u32, now: DateTime<Local>) -> Result<()> {
        self.store
            .set(&self.keys.daily_steps, &daily_steps.to_string())
            .await?;
        self.store
            .set(&self.keys.last_update, &now.to_rfc3339())
            .await?;
        self.write_day_slot(DaySlot {
            date: now.date_naive(),
            steps: daily_steps,
        })
        .await
    }

    pub async fn load_daily_steps(&self) -> u32 {
        self.load_daily_steps_at(Local::now()).await
    }

    /// Stored count if it was written on `now`'s local calendar day, else 0.
    pub async fn load_daily_steps_at(&self, now: DateTime<Local>) -> u32 {
        match self.try_load_daily(now).await {
            Ok(steps) => steps,
            Err(err) => {
                log_error!("Error loading steps from storage: {err:#}");
                0
            }
        }
    }

    async fn try_load_daily(&self, now: DateTime<Local>) -> Result<u32> {
        let stored = self.store.get(&self.keys.daily_steps).await?;
        let last_update = self.store.get(&self.keys.last_update).await?;
        let (Some(stored), Some(last_update)) = (stored, last_update) else {
            return Ok(0);
        };

        let last_update = DateTime::parse_from_rfc3339(&last_update)
            .with_context(|| format!("invalid last update timestamp '{last_update}'"))?
            .with_timezone(&Local);
        if last_update.date_naive() != now.date_naive() {
            log_info!(
                "Stored steps are from {}, starting {} at 0",
                last_update.date_naive(),
                now.date_naive()
            );
            return Ok(0);
        }

        let steps = stored
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid stored daily steps '{stored}'"))?;
        log_info!("Loaded {} steps from storage", steps);
        Ok(steps)
    }

    /// Cached history generated on `today`, with today's slot replaced by the
    /// live count.
    pub async fn cached_weekly_history(
        &self,
        current_steps: u32,
        today: NaiveDate,
    ) -> Option<WeeklySteps> {
        let raw = match self.store.get(&self.keys.weekly_steps).await {
            Ok(raw) => raw?,
            Err(err) => {
                log_error!("Error loading stored weekly steps: {err:#}");
                return None;
            }
        };

        let cache: WeeklyCache = match serde_json::from_str(&raw) {
            Ok(cache) => cache,
            Err(err) => {
                log_warn!("Discarding malformed weekly step cache: {err}");
                return None;
            }
        };

        if cache.generated_on != today {
            log_debug!("Weekly step cache from {} is stale", cache.generated_on);
            return None;
        }
        Some(cache.steps.with_today(current_steps))
    }

    pub async fn save_weekly_history(&self, steps: WeeklySteps, today: NaiveDate) {
        let cache = WeeklyCache {
            generated_on: today,
            steps,
        };
        let result = match serde_json::to_string(&cache) {
            Ok(json) => self.store.set(&self.keys.weekly_steps, &json).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = result {
            log_error!("Error saving weekly step history: {err:#}");
        }
    }

    pub async fn load_weekly_history(&self, current_steps: u32) -> WeeklySteps {
        self.load_weekly_history_at(current_steps, Local::now()).await
    }

    /// Cached history when fresh, otherwise rebuilt from the day slots.
    pub async fn load_weekly_history_at(
        &self,
        current_steps: u32,
        now: DateTime<Local>,
    ) -> WeeklySteps {
        if let Some(cached) = self
            .cached_weekly_history(current_steps, now.date_naive())
            .await
        {
            return cached;
        }
        self.rebuild_weekly_history(current_steps, now).await
    }

    /// Rebuilds the week from per-day slots. Missing past days are derived
    /// from `current_steps` and persisted so later reads agree. With no data
    /// anywhere the hardcoded defaults are returned.
    pub async fn rebuild_weekly_history(
        &self,
        current_steps: u32,
        now: DateTime<Local>,
    ) -> WeeklySteps {
        let dates = week_dates(now.date_naive());
        let mut steps = [0u32; DAYS_IN_WEEK];
        let mut missing = Vec::new();
        let mut found_any = false;

        for (index, date) in dates.iter().enumerate().take(DAYS_IN_WEEK - 1) {
            match self.read_day_slot(*date).await {
                Ok(Some(recorded)) => {
                    steps[index] = recorded;
                    found_any = true;
                }
                Ok(None) => missing.push(index),
                Err(err) => {
                    log_warn!("Error handling steps for {}: {err:#}", date);
                    steps[index] = current_steps;
                }
            }
        }
        steps[DAYS_IN_WEEK - 1] = current_steps;

        if !found_any && current_steps == 0 {
            log_info!("No step history available, using default weekly steps");
            return DEFAULT_WEEKLY_STEPS;
        }

        for index in missing {
            let estimate = derive_estimate(current_steps, &mut rand::thread_rng());
            steps[index] = estimate;
            let slot = DaySlot {
                date: dates[index],
                steps: estimate,
            };
            if let Err(err) = self.write_day_slot(slot).await {
                log_warn!("Error storing derived steps for {}: {err:#}", slot.date);
            }
        }

        let history = WeeklySteps(steps);
        self.save_weekly_history(history, now.date_naive()).await;
        log_info!("Generated weekly step history: {:?}", history.as_array());
        history
    }

    /// Zeroes today's count and drops the weekly cache. Past day slots stay.
    pub async fn reset(&self) {
        self.reset_at(Local::now()).await;
    }

    pub async fn reset_at(&self, now: DateTime<Local>) {
        self.record_steps_at(0, now).await;
        if let Err(err) = self.store.remove(&self.keys.weekly_steps).await {
            log_warn!("Error clearing weekly step cache: {err:#}");
        }
    }

    async fn read_day_slot(&self, date: NaiveDate) -> Result<Option<u32>> {
        let key = self.keys.day_slot(weekday_slot(date));
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<DaySlot>(&raw) {
            Ok(slot) if slot.date == date => Ok(Some(slot.steps)),
            Ok(_) => Ok(None),
            Err(err) => {
                log_warn!("Discarding malformed day slot {key}: {err}");
                Ok(None)
            }
        }
    }

    async fn write_day_slot(&self, slot: DaySlot) -> Result<()> {
        let key = self.keys.day_slot(weekday_slot(slot.date));
        let json = serde_json::to_string(&slot).context("failed to serialize day slot")?;
        self.store.set(&key, &json).await
    }
}
