//! Effects control plane
//!
//! - [`EffectChainSlot`]: parameters, presets and channel routing of one chain
//! - [`EffectSlot`]: one effect position inside a chain
//! - [`ChainPresetManager`]: ordered preset store
//! - [`EffectsRegistry`]: loadable effects and their factories
//! - [`EffectsManager`]: owns the chains and the control end of the ring

pub mod backend;
mod builtin;
pub mod chain_slot;
pub mod manager;
pub mod preset;
pub mod slot;

pub use backend::{
    EffectBackendType, EffectError, EffectFactory, EffectManifest, EffectVisibility,
    EffectsRegistry, RegisteredEffect,
};
pub use builtin::{EmptyState, GainProcessor, GainState, InvertProcessor};
pub use chain_slot::{ChainError, EffectChainSlot};
pub use manager::EffectsManager;
pub use preset::{
    read_presets, shared_presets, write_presets, ChainPreset, ChainPresetManager, EffectPreset,
    PresetError, SharedPresets,
};
pub use slot::{EffectSlot, EffectSlotHandle};
