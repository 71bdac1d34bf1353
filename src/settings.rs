use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::calories::CALORIES_PER_STEP;
use crate::detection::DetectorConfig;
use crate::source::SourcePolicy;

pub const DEFAULT_STORAGE_PREFIX: &str = "steptrack_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub detector: DetectorConfig,
    pub source_policy: SourcePolicy,
    pub calories_per_step: f64,
    pub storage_prefix: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            source_policy: SourcePolicy::default(),
            calories_per_step: CALORIES_PER_STEP,
            storage_prefix: DEFAULT_STORAGE_PREFIX.into(),
        }
    }
}

/// JSON-file backed settings. A missing or unreadable file yields defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                TrackerSettings::default()
            })
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, TrackerSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, TrackerSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn tracker(&self) -> TrackerSettings {
        self.read().clone()
    }

    pub fn update_tracker(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
