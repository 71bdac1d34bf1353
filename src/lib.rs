pub mod calories;
pub mod db;
pub mod detection;
pub mod ledger;
pub mod models;
pub mod sensors;
pub mod settings;
pub mod source;
pub mod storage;
pub mod tracking;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

pub use calories::CalorieModel;
pub use db::Database;
pub use detection::{DetectorConfig, PeakDetector, StepDetector};
pub use ledger::StepLedger;
pub use models::{AccelerationSample, SourceKind, StepEvent, WeeklySteps};
pub use settings::{SettingsStore, TrackerSettings};
pub use source::{PlatformStepAdapter, SourcePolicy};
pub use storage::{KeyValueStore, MemoryStore};
pub use tracking::{StepUpdate, TrackingController, TrackingState, TrackingStatus};

use sensors::{synthetic_walk, ScriptedAccelerometer};

const DEFAULT_DATA_DIR: &str = "steptrack-data";
const DEFAULT_SAMPLE_COUNT: usize = 100;

fn data_dir() -> PathBuf {
    std::env::var_os("STEPTRACK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn sample_count() -> usize {
    match std::env::args().nth(1) {
        Some(arg) => arg.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid sample count '{arg}', using {DEFAULT_SAMPLE_COUNT}");
            DEFAULT_SAMPLE_COUNT
        }),
        None => DEFAULT_SAMPLE_COUNT,
    }
}

/// Runs a tracking session over a synthetic walk and reports the result.
pub fn run() -> Result<()> {
    let level = if std::env::var_os("STEPTRACK_DEBUG").is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("steptrack starting up...");

    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let database = Database::new(data_dir.join("steptrack.sqlite3"))?;
    let settings_path = data_dir.join("settings.json");
    let seed_settings = !settings_path.exists();
    let settings_store = SettingsStore::new(settings_path.clone())?;
    let settings = settings_store.tracker();
    if seed_settings {
        settings_store.update_tracker(settings.clone())?;
        info!("Wrote default settings to {}", settings_path.display());
    }
    let samples = synthetic_walk(sample_count());

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        let accelerometer = Arc::new(ScriptedAccelerometer::new());
        let controller = TrackingController::from_settings(
            &settings,
            accelerometer.clone(),
            None,
            Arc::new(database),
        );

        let mut updates = controller.subscribe();
        let calories_per_step = settings.calories_per_step;
        let calorie_task = tokio::spawn(async move {
            let mut model: Option<CalorieModel> = None;
            while let Ok(update) = updates.recv().await {
                match model.as_mut() {
                    Some(model) => {
                        model.apply(update.daily_steps);
                    }
                    None => {
                        model = Some(CalorieModel::new(calories_per_step, update.daily_steps));
                    }
                }
            }
            model.unwrap_or_default()
        });

        let started = controller.start_tracking().await?;
        info!(
            "Session {} walking {} samples from {} steps",
            started.session_id,
            samples.len(),
            started.steps
        );

        accelerometer.play(&samples).await;
        controller.stop_tracking().await?;

        let weekly = controller.get_weekly_step_history().await;
        let daily_steps = controller.daily_steps().await;
        drop(controller);

        let calories = calorie_task.await.context("calorie task failed")?;
        info!("Steps today: {daily_steps}");
        info!(
            "Weekly steps (oldest first): {:?}, {} in total",
            weekly.as_array(),
            weekly.total()
        );
        info!(
            "Calories burned this session: {:.2}",
            calories.calories_burned()
        );
        Ok(())
    })
}
