use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use log::{debug, error, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ledger::StepLedger;
use crate::models::{SourceKind, StepIncrement, WeeklySteps};
use crate::sensors::{Accelerometer, Pedometer};
use crate::settings::TrackerSettings;
use crate::source::{IncrementStream, PlatformStepAdapter};
use crate::storage::KeyValueStore;

use super::{TrackingState, TrackingStatus};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Published after every change to the daily total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub daily_steps: u32,
    pub increment: u32,
    pub source: Option<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStarted {
    pub steps: u32,
    pub session_id: String,
}

struct TrackingWorker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Cancels every session worker once the last controller handle is gone.
struct ShutdownGuard {
    token: CancellationToken,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Shared pieces the increment loop needs. Never holds a controller handle.
#[derive(Clone)]
struct SessionCore {
    state: Arc<Mutex<TrackingState>>,
    adapter: Arc<Mutex<PlatformStepAdapter>>,
    ledger: StepLedger,
    updates: broadcast::Sender<StepUpdate>,
}

/// Owns the tracking session: starts and stops the step sources, folds their
/// increments into the daily total, writes through to the ledger and publishes
/// [`StepUpdate`]s.
#[derive(Clone)]
pub struct TrackingController {
    core: SessionCore,
    worker: Arc<Mutex<Option<TrackingWorker>>>,
    // Serialises start and stop so a stop issued mid-start waits for it.
    lifecycle: Arc<Mutex<()>>,
    shutdown: Arc<ShutdownGuard>,
}

impl TrackingController {
    pub fn new(adapter: PlatformStepAdapter, ledger: StepLedger) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            core: SessionCore {
                state: Arc::new(Mutex::new(TrackingState::new())),
                adapter: Arc::new(Mutex::new(adapter)),
                ledger,
                updates,
            },
            worker: Arc::new(Mutex::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
            shutdown: Arc::new(ShutdownGuard {
                token: CancellationToken::new(),
            }),
        }
    }

    /// Wires an adapter and ledger from persisted settings.
    pub fn from_settings(
        settings: &TrackerSettings,
        accelerometer: Arc<dyn Accelerometer>,
        pedometer: Option<Arc<dyn Pedometer>>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let adapter = PlatformStepAdapter::new(
            accelerometer,
            pedometer,
            settings.detector.clone(),
            settings.source_policy,
        );
        let ledger = StepLedger::new(store, &settings.storage_prefix);
        Self::new(adapter, ledger)
    }

    pub fn ledger(&self) -> &StepLedger {
        &self.core.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepUpdate> {
        self.core.updates.subscribe()
    }

    pub async fn snapshot(&self) -> TrackingState {
        self.core.roll_over(Local::now()).await;
        self.core.state.lock().await.clone()
    }

    pub async fn daily_steps(&self) -> u32 {
        self.core.roll_over(Local::now()).await;
        self.core.state.lock().await.daily_steps
    }

    pub async fn is_tracking(&self) -> bool {
        self.core.state.lock().await.status == TrackingStatus::Active
    }

    pub async fn start_tracking(&self) -> Result<TrackingStarted> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut state = self.core.state.lock().await;
            if state.status != TrackingStatus::Idle {
                bail!("step tracking already active");
            }
            state.begin_starting();
        }

        info!("Starting step tracking...");
        match self.activate().await {
            Ok(started) => {
                info!(
                    "Step tracking session {} started at {} steps",
                    started.session_id, started.steps
                );
                Ok(started)
            }
            Err(err) => {
                let reason =
                    format!("Failed to start step tracking. Please check permissions: {err:#}");
                error!("{reason}");
                self.core.state.lock().await.fail(reason.clone());
                Err(anyhow!(reason))
            }
        }
    }

    async fn activate(&self) -> Result<TrackingStarted> {
        let now = Local::now();
        let mut initial_steps = self.core.ledger.load_daily_steps_at(now).await;

        let mut adapter = self.core.adapter.lock().await;
        let native_available = adapter.check_availability().await;
        if native_available {
            if let Some(native_steps) = adapter.native_steps_today(now).await {
                info!("Initial steps from native pedometer: {native_steps}");
                initial_steps = native_steps;
                self.core.ledger.record_steps_at(initial_steps, now).await;
            }
        }

        let increments = adapter.start(initial_steps, native_available)?;
        drop(adapter);

        let session_id = Uuid::new_v4().to_string();
        let generation = self.core.state.lock().await.activate(
            session_id.clone(),
            initial_steps,
            native_available,
            Utc::now(),
            now.date_naive(),
        );

        self.spawn_worker(increments, generation).await;
        self.publish(StepUpdate {
            daily_steps: initial_steps,
            increment: 0,
            source: None,
        });

        Ok(TrackingStarted {
            steps: initial_steps,
            session_id,
        })
    }

    /// Idempotent. Waits for an in-flight ledger write to land; increments
    /// that arrive afterwards are dropped.
    pub async fn stop_tracking(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut state = self.core.state.lock().await;
            if state.status == TrackingStatus::Idle {
                return Ok(());
            }
            state.begin_stopping();
        }

        let worker = self.worker.lock().await.take();
        let join_result = match worker {
            Some(worker) => {
                worker.cancel_token.cancel();
                worker
                    .handle
                    .await
                    .context("tracking loop task failed to join")
            }
            None => Ok(()),
        };

        self.core.adapter.lock().await.stop();
        self.core.state.lock().await.finish();
        info!("Step tracking stopped");

        join_result
    }

    /// Zeroes today's total without changing the tracking status.
    pub async fn reset(&self) {
        self.core.state.lock().await.reset_steps();
        self.core.adapter.lock().await.reset(0);
        self.core.ledger.reset().await;
        self.publish(StepUpdate {
            daily_steps: 0,
            increment: 0,
            source: None,
        });
        info!("Daily steps reset");
    }

    /// Seven days ending today, oldest first. Today's slot is the live total.
    pub async fn get_weekly_step_history(&self) -> WeeklySteps {
        let now = Local::now();
        let today = now.date_naive();
        self.core.roll_over(now).await;

        let active_steps = {
            let state = self.core.state.lock().await;
            (state.status == TrackingStatus::Active).then_some(state.daily_steps)
        };
        let current_steps = match active_steps {
            Some(steps) => steps,
            None => self.core.ledger.load_daily_steps_at(now).await,
        };

        if let Some(cached) = self
            .core
            .ledger
            .cached_weekly_history(current_steps, today)
            .await
        {
            debug!("Using stored weekly step history: {:?}", cached.as_array());
            return cached;
        }

        let native = self
            .core
            .adapter
            .lock()
            .await
            .native_weekly_history(current_steps, now)
            .await;
        if let Some(history) = native {
            let history = history.with_today(current_steps);
            self.core.ledger.save_weekly_history(history, today).await;
            info!("Native weekly step history: {:?}", history.as_array());
            return history;
        }

        self.core
            .ledger
            .rebuild_weekly_history(current_steps, now)
            .await
    }

    async fn spawn_worker(&self, increments: IncrementStream, generation: u64) {
        let mut worker_guard = self.worker.lock().await;
        if let Some(previous) = worker_guard.take() {
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        let cancel_token = self.shutdown.token.child_token();
        let handle = tokio::spawn(tracking_loop(
            self.core.clone(),
            increments,
            cancel_token.clone(),
            generation,
        ));

        *worker_guard = Some(TrackingWorker {
            handle,
            cancel_token,
        });
    }

    fn publish(&self, update: StepUpdate) {
        self.core.publish(update);
    }
}

impl SessionCore {
    /// Moves the running total onto `now`'s local day when midnight has
    /// passed since it was last counted.
    async fn roll_over(&self, now: DateTime<Local>) {
        if !self.state.lock().await.roll_to(now.date_naive()) {
            return;
        }

        info!("Local day changed, daily steps restarted");
        self.adapter.lock().await.reset(0);
        self.ledger.record_steps_at(0, now).await;
        self.publish(StepUpdate {
            daily_steps: 0,
            increment: 0,
            source: None,
        });
    }

    async fn apply_increment(&self, increment: StepIncrement, generation: u64) {
        let now = Local::now();
        let applied = {
            let mut state = self.state.lock().await;
            if !state.accepts(generation) {
                debug!("Discarding {} steps after session ended", increment.steps);
                return;
            }
            state.apply_increment(increment.steps, now.date_naive())
        };

        if applied.rolled_over {
            info!("Local day changed during tracking, daily steps restarted");
            self.adapter.lock().await.reset(0);
        }

        self.ledger.record_steps_at(applied.daily_steps, now).await;
        debug!(
            "Steps detected: +{} ({}), total {}",
            increment.steps,
            increment.source.as_str(),
            applied.daily_steps
        );
        self.publish(StepUpdate {
            daily_steps: applied.daily_steps,
            increment: increment.steps,
            source: Some(increment.source),
        });
    }

    fn publish(&self, update: StepUpdate) {
        // No receivers is fine.
        let _ = self.updates.send(update);
    }
}

async fn tracking_loop(
    core: SessionCore,
    mut increments: IncrementStream,
    cancel_token: CancellationToken,
    generation: u64,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            increment = increments.recv() => match increment {
                Some(increment) => core.apply_increment(increment, generation).await,
                None => {
                    debug!("step sources closed their increment stream");
                    break;
                }
            },
        }
    }
}
