use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::channels::ChannelConfiguration;
use crate::custom::CustomFields;
use crate::hardware::DeviceSpec;

const SETTINGS_FILE: &str = ".physio_recorder.json";
const CONFIG_ENV: &str = "PHYSIO_RECORDER_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPosition {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub channels: ChannelConfiguration,
    pub sample_period_secs: f64,
    pub custom: CustomFields,
    pub window_position: Option<WindowPosition>,
    /// How often the console refreshes status and pending rows.
    pub ui_tick_ms: u64,
    /// How often the scanner is queried.
    pub status_tick_ms: u64,
    pub status_program: String,
    pub status_timeout_ms: u64,
    pub device: DeviceSpec,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            channels: ChannelConfiguration::default(),
            sample_period_secs: 1.0,
            custom: CustomFields::default(),
            window_position: None,
            ui_tick_ms: 100,
            status_tick_ms: 400,
            status_program: "pvcmd".into(),
            status_timeout_ms: 5_000,
            device: DeviceSpec::None,
        }
    }
}

impl RecorderSettings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(self.sample_period_secs)
    }

    pub fn set_sample_period(&mut self, secs: f64) -> Result<()> {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("sample period must be a positive number of seconds, got {secs}");
        }
        self.sample_period_secs = secs;
        Ok(())
    }

    /// Replace values a hand-edited file may have broken with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.channels = self
            .channels
            .validated()
            .unwrap_or_else(|_| defaults.channels.clone());
        if !self.sample_period_secs.is_finite() || self.sample_period_secs <= 0.0 {
            self.sample_period_secs = defaults.sample_period_secs;
        }
        self.custom = self.custom.normalized();
        if self.ui_tick_ms == 0 {
            self.ui_tick_ms = defaults.ui_tick_ms;
        }
        if self.status_tick_ms == 0 {
            self.status_tick_ms = defaults.status_tick_ms;
        }
        self
    }
}

/// Settings file location: `explicit` if given, else `$PHYSIO_RECORDER_CONFIG`,
/// else `~/.physio_recorder.json`.
pub fn settings_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| crate::utils::home_dir().join(SETTINGS_FILE))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<RecorderSettings>,
}

impl SettingsStore {
    /// Open the store at `path`. A missing or unreadable file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse(&contents)
        } else {
            RecorderSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> RecorderSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `change` and persist. Nothing is written or kept when `change`
    /// fails.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut RecorderSettings) -> Result<()>,
    {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        change(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    /// Write the current settings to disk.
    pub fn save(&self) -> Result<()> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        self.persist(&guard)
    }

    /// Re-read the file, keeping the in-memory settings if it is missing.
    pub fn reload(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data = parse(&contents);
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &RecorderSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn parse(contents: &str) -> RecorderSettings {
    serde_json::from_str::<RecorderSettings>(contents)
        .unwrap_or_default()
        .sanitized()
}
