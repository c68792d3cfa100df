use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::camera::SourceConfig;
use crate::gaze::ScreenBounds;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecorderSettings {
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub screen_width: f64,
    pub screen_height: f64,
    pub image_save_interval_secs: f64,
    pub jpeg_quality: u8,
    pub output_root: PathBuf,
    pub exit_after_stop: bool,
    pub auto_start_after_calibration: bool,
    pub heartbeat_interval_secs: u32,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
            screen_width: 1920.0,
            screen_height: 1080.0,
            image_save_interval_secs: 2.0,
            jpeg_quality: 85,
            output_root: PathBuf::from("."),
            exit_after_stop: true,
            auto_start_after_calibration: true,
            heartbeat_interval_secs: 5,
        }
    }
}

impl RecorderSettings {
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            device_id: self.device_id,
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    pub fn screen_bounds(&self) -> ScreenBounds {
        ScreenBounds::new(self.screen_width, self.screen_height)
    }

    /// Falls back to the default interval when the configured one is not a
    /// positive number of seconds.
    pub fn image_save_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.image_save_interval_secs)
            .ok()
            .filter(|interval| !interval.is_zero())
            .unwrap_or(Duration::from_secs(2))
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<RecorderSettings>,
}

impl SettingsStore {
    /// Loads `path` if it exists. A file that fails to parse is logged and
    /// replaced by defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed settings in {}: {}", path.display(), err);
                RecorderSettings::default()
            })
        } else {
            RecorderSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, RecorderSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecorderSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> RecorderSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: RecorderSettings) -> Result<()> {
        let mut guard = self.write();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &RecorderSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: RecorderSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("gazerec.json")).unwrap();
        let settings = store.settings();
        assert_eq!(settings, RecorderSettings::default());
        assert_eq!(settings.image_save_interval(), Duration::from_secs(2));
        assert_eq!(settings.source_config().fps, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazerec.json");
        fs::write(&path, r#"{ "fps": 60, "jpeg_quality": 0 }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.fps, 60);
        assert_eq!(settings.width, 640);
        assert_eq!(settings.jpeg_quality(), 1);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazerec.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.image_save_interval_secs = -1.0;
        settings.output_root = PathBuf::from("/data/sessions");
        store.update(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.settings(), settings);
        assert_eq!(reopened.settings().image_save_interval(), Duration::from_secs(2));
        reopened.reload().unwrap();
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gazerec.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().settings(), RecorderSettings::default());
    }
}
