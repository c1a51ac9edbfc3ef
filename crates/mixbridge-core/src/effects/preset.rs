//! Chain presets and the preset store
//!
//! A [`ChainPreset`] is pure data: mix mode, super knob default and one
//! [`EffectPreset`] per effect slot. The [`ChainPresetManager`] keeps an
//! ordered list of presets that chain slots navigate by index.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{save_config, try_load_config};
use crate::types::EffectChainMixMode;

// ─────────────────────────────────────────────────────────────────────────────
// Preset data
// ─────────────────────────────────────────────────────────────────────────────

/// What to load into one effect slot
///
/// An empty preset (no effect id) clears the slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectPreset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_id: Option<String>,
    /// Overrides the manifest's default meta-parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_parameter: Option<f64>,
}

impl EffectPreset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn effect(id: impl Into<String>) -> Self {
        Self {
            effect_id: Some(id.into()),
            meta_parameter: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effect_id.is_none()
    }
}

/// Saved configuration of a whole chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPreset {
    pub name: String,
    #[serde(default)]
    pub mix_mode: EffectChainMixMode,
    /// Default value of the chain's super knob
    #[serde(default)]
    pub super_knob: f64,
    #[serde(default)]
    pub effect_presets: Vec<EffectPreset>,
}

impl ChainPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mix_mode: EffectChainMixMode::default(),
            super_knob: 0.0,
            effect_presets: Vec::new(),
        }
    }

    pub fn with_effects(mut self, effects: Vec<EffectPreset>) -> Self {
        self.effect_presets = effects;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preset store
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from preset store edits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("Preset not found: {0}")]
    NotFound(String),

    #[error("Preset already exists: {0}")]
    AlreadyExists(String),

    #[error("Preset order must name every preset exactly once")]
    InvalidOrder,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: Vec<ChainPreset>,
}

/// Ordered store of chain presets
#[derive(Debug, Default)]
pub struct ChainPresetManager {
    presets: Vec<Arc<ChainPreset>>,
}

/// Preset store shared between chain slots
pub type SharedPresets = Arc<RwLock<ChainPresetManager>>;

pub fn shared_presets(manager: ChainPresetManager) -> SharedPresets {
    Arc::new(RwLock::new(manager))
}

/// Read-lock the store, recovering from a poisoned lock
pub fn read_presets(presets: &SharedPresets) -> RwLockReadGuard<'_, ChainPresetManager> {
    match presets.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Write-lock the store, recovering from a poisoned lock
pub fn write_presets(presets: &SharedPresets) -> RwLockWriteGuard<'_, ChainPresetManager> {
    match presets.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ChainPresetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_presets(presets: impl IntoIterator<Item = ChainPreset>) -> Self {
        Self {
            presets: presets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load presets from a YAML file; a missing file gives an empty store
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file: PresetFile = try_load_config(path)?.unwrap_or_default();
        log::info!(
            "ChainPresetManager: loaded {} presets from {:?}",
            file.presets.len(),
            path
        );
        Ok(Self::from_presets(file.presets))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = PresetFile {
            presets: self.presets.iter().map(|p| (**p).clone()).collect(),
        };
        save_config(&file, path)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Position of the preset called `name`
    pub fn preset_index(&self, name: &str) -> Option<usize> {
        self.presets.iter().position(|p| p.name == name)
    }

    /// Preset at `index`, wrapping in both directions
    ///
    /// Navigation computes `current ± 1` without bounds checks; this folds
    /// the result back into the store.
    pub fn preset_at_index(&self, index: isize) -> Option<Arc<ChainPreset>> {
        if self.presets.is_empty() {
            return None;
        }
        let wrapped = index.rem_euclid(self.presets.len() as isize) as usize;
        self.presets.get(wrapped).cloned()
    }

    pub fn preset(&self, name: &str) -> Option<Arc<ChainPreset>> {
        self.presets.iter().find(|p| p.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.iter().map(|p| p.name.clone()).collect()
    }

    /// Add a preset at the end, or replace the one with the same name in place
    pub fn import_preset(&mut self, preset: ChainPreset) {
        match self.preset_index(&preset.name) {
            Some(index) => self.presets[index] = Arc::new(preset),
            None => self.presets.push(Arc::new(preset)),
        }
    }

    pub fn add_preset(&mut self, preset: ChainPreset) -> Result<(), PresetError> {
        if self.preset_index(&preset.name).is_some() {
            return Err(PresetError::AlreadyExists(preset.name));
        }
        self.presets.push(Arc::new(preset));
        Ok(())
    }

    pub fn remove_preset(&mut self, name: &str) -> Result<Arc<ChainPreset>, PresetError> {
        let index = self
            .preset_index(name)
            .ok_or_else(|| PresetError::NotFound(name.to_string()))?;
        Ok(self.presets.remove(index))
    }

    pub fn rename_preset(&mut self, old_name: &str, new_name: &str) -> Result<(), PresetError> {
        if old_name != new_name && self.preset_index(new_name).is_some() {
            return Err(PresetError::AlreadyExists(new_name.to_string()));
        }
        let index = self
            .preset_index(old_name)
            .ok_or_else(|| PresetError::NotFound(old_name.to_string()))?;
        let mut renamed = (*self.presets[index]).clone();
        renamed.name = new_name.to_string();
        self.presets[index] = Arc::new(renamed);
        Ok(())
    }

    /// Reorder presets; `order` must be a permutation of the current names
    pub fn set_preset_order(&mut self, order: &[String]) -> Result<(), PresetError> {
        if order.len() != self.presets.len() {
            return Err(PresetError::InvalidOrder);
        }
        let mut reordered = Vec::with_capacity(order.len());
        for name in order {
            if reordered.iter().any(|p: &Arc<ChainPreset>| &p.name == name) {
                return Err(PresetError::InvalidOrder);
            }
            let preset = self.preset(name).ok_or(PresetError::InvalidOrder)?;
            reordered.push(preset);
        }
        self.presets = reordered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(names: &[&str]) -> ChainPresetManager {
        ChainPresetManager::from_presets(names.iter().map(|n| ChainPreset::new(*n)))
    }

    #[test]
    fn test_wraparound_both_directions() {
        let presets = store(&["a", "b", "c"]);
        assert_eq!(presets.preset_at_index(3).unwrap().name, "a");
        assert_eq!(presets.preset_at_index(-1).unwrap().name, "c");
        assert_eq!(presets.preset_at_index(-4).unwrap().name, "c");
        assert!(ChainPresetManager::new().preset_at_index(0).is_none());
    }

    #[test]
    fn test_next_m_times_returns_to_start() {
        let presets = store(&["a", "b", "c", "d", "e"]);
        for start in 0..presets.len() {
            let mut index = start as isize;
            for _ in 0..presets.len() {
                let next = presets.preset_at_index(index + 1).unwrap();
                index = presets.preset_index(&next.name).unwrap() as isize;
            }
            assert_eq!(index as usize, start);
        }
    }

    #[test]
    fn test_add_remove_rename() {
        let mut presets = store(&["a", "b"]);
        assert_eq!(
            presets.add_preset(ChainPreset::new("a")),
            Err(PresetError::AlreadyExists("a".to_string()))
        );
        presets.add_preset(ChainPreset::new("c")).unwrap();
        presets.rename_preset("b", "bee").unwrap();
        assert_eq!(presets.names(), vec!["a", "bee", "c"]);

        assert_eq!(presets.remove_preset("a").unwrap().name, "a");
        assert!(presets.remove_preset("a").is_err());
        assert_eq!(presets.preset_index("c"), Some(1));
    }

    #[test]
    fn test_set_preset_order() {
        let mut presets = store(&["a", "b", "c"]);
        let order = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        presets.set_preset_order(&order).unwrap();
        assert_eq!(presets.names(), order);

        let duplicate = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(presets.set_preset_order(&duplicate), Err(PresetError::InvalidOrder));
        assert_eq!(presets.names(), order);
    }

    #[test]
    fn test_file_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain-presets.yaml");

        assert!(ChainPresetManager::load_from_file(&path).unwrap().is_empty());

        let mut preset = ChainPreset::new("Echo Out").with_effects(vec![
            EffectPreset::effect("gain"),
            EffectPreset::empty(),
        ]);
        preset.mix_mode = EffectChainMixMode::DryPlusWet;
        preset.super_knob = 0.25;
        let presets = ChainPresetManager::from_presets([preset.clone()]);
        presets.save_to_file(&path).unwrap();

        let loaded = ChainPresetManager::load_from_file(&path).unwrap();
        assert_eq!(*loaded.preset("Echo Out").unwrap(), preset);
    }
}
