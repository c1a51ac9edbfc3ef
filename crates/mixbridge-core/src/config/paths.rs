//! Default locations for settings and preset files

use std::path::PathBuf;

/// Base directory for mixbridge data
///
/// Returns `<config dir>/mixbridge` (e.g. `~/.config/mixbridge` on Linux),
/// or `./mixbridge` when the platform has no config directory.
pub fn default_data_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixbridge")
}

/// Default settings file: `<data>/settings.yaml`
pub fn default_settings_path() -> PathBuf {
    default_data_path().join("settings.yaml")
}

/// Default chain preset file: `<data>/chain-presets.yaml`
pub fn default_presets_path() -> PathBuf {
    default_data_path().join("chain-presets.yaml")
}
