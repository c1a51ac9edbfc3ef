//! Persisted user settings
//!
//! Components never reach into a global config object. They receive a
//! [`SharedSettings`] at construction and read/write only the keys they own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::io::{load_config, save_config};
use crate::control::ConfigKey;

/// Key/value settings storage addressed by [`ConfigKey`]
///
/// Values are stored as strings; the typed helpers parse on read and fall
/// back to the given default when a key is missing or unparsable.
pub trait SettingsProvider {
    fn get(&self, key: &ConfigKey) -> Option<String>;

    fn set(&mut self, key: &ConfigKey, value: String);

    fn get_f64(&self, key: &ConfigKey, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(default)
    }

    fn get_i32(&self, key: &ConfigKey, default: i32) -> i32 {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v as i32)
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &ConfigKey, default: bool) -> bool {
        match self.get(key).as_deref().map(str::trim) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            _ => default,
        }
    }

    fn set_i32(&mut self, key: &ConfigKey, value: i32) {
        self.set(key, value.to_string());
    }

    fn set_bool(&mut self, key: &ConfigKey, value: bool) {
        self.set(key, if value { "1" } else { "0" }.to_string());
    }
}

/// Settings shared between components on the control thread
pub type SharedSettings = Arc<Mutex<dyn SettingsProvider + Send>>;

/// Wrap a provider for sharing
pub fn shared_settings<S>(settings: S) -> SharedSettings
where
    S: SettingsProvider + Send + 'static,
{
    Arc::new(Mutex::new(settings))
}

/// Lock shared settings, recovering from a poisoned lock
///
/// Settings are plain values, so a panic elsewhere while holding the lock
/// cannot leave them in a state worse than "partially updated".
pub fn lock_settings(settings: &SharedSettings) -> MutexGuard<'_, dyn SettingsProvider + Send + 'static> {
    match settings.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    groups: BTreeMap<String, BTreeMap<String, String>>,
}

/// Settings stored as a YAML file of `group -> item -> value`
#[derive(Debug, Default)]
pub struct YamlSettings {
    path: Option<PathBuf>,
    file: SettingsFile,
    dirty: bool,
}

impl YamlSettings {
    /// Settings that are never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a settings file; missing or broken files start empty
    pub fn open(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            file: load_config(path),
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether values changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the settings back to their file (no-op for in-memory settings)
    pub fn save(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            save_config(&self.file, path)?;
            log::info!("YamlSettings: saved {:?}", path);
        }
        self.dirty = false;
        Ok(())
    }
}

impl SettingsProvider for YamlSettings {
    fn get(&self, key: &ConfigKey) -> Option<String> {
        self.file
            .groups
            .get(&key.group)
            .and_then(|items| items.get(&key.item))
            .cloned()
    }

    fn set(&mut self, key: &ConfigKey, value: String) {
        self.file
            .groups
            .entry(key.group.clone())
            .or_default()
            .insert(key.item.clone(), value);
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_helpers_fall_back_to_default() {
        let mut settings = YamlSettings::in_memory();
        let key = ConfigKey::new("[VinylControl]", "mode_ch1");

        assert_eq!(settings.get_i32(&key, 1), 1);
        settings.set(&key, "garbage".to_string());
        assert_eq!(settings.get_i32(&key, 1), 1);
        settings.set_i32(&key, 2);
        assert_eq!(settings.get_i32(&key, 1), 2);

        let flag = ConfigKey::new("[Channel1]", "vinylcontrol_enabled");
        assert!(settings.get_bool(&flag, true));
        settings.set_bool(&flag, false);
        assert!(!settings.get_bool(&flag, true));
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let key = ConfigKey::new("[VinylControl]", "cueing_ch2");

        let mut settings = YamlSettings::open(&path);
        settings.set_i32(&key, 2);
        assert!(settings.is_dirty());
        settings.save().unwrap();
        assert!(!settings.is_dirty());

        let reopened = YamlSettings::open(&path);
        assert_eq!(reopened.get_i32(&key, 0), 2);
    }

    #[test]
    fn test_shared_settings_coerce() {
        let shared = shared_settings(YamlSettings::in_memory());
        let key = ConfigKey::new("[Test]", "value");
        lock_settings(&shared).set_i32(&key, 7);
        assert_eq!(lock_settings(&shared).get_i32(&key, 0), 7);
    }
}
