//! Configuration and persisted settings
//!
//! - Generic YAML config loading/saving
//! - Default file locations
//! - The [`SettingsProvider`] interface injected into components that
//!   persist per-deck or per-effect preferences
//!
//! # Usage
//!
//! ```ignore
//! use mixbridge_core::config::{default_settings_path, shared_settings, YamlSettings};
//!
//! let settings = shared_settings(YamlSettings::open(&default_settings_path()));
//! ```

mod io;
mod paths;
mod settings;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{default_data_path, default_presets_path, default_settings_path};
pub use settings::{lock_settings, shared_settings, SettingsProvider, SharedSettings, YamlSettings};
