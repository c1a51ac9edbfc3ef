//! Effect manifests, factories and the effect registry
//!
//! The registry is the control thread's catalogue of loadable effects. Each
//! entry pairs a manifest (id, name, backend) with a factory that builds
//! the engine-side processor and its per-channel states.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::SettingsProvider;
use crate::control::ConfigKey;
use crate::engine::{EffectProcessor, EffectState};

/// Where an effect implementation comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectBackendType {
    BuiltIn,
    Lv2,
    Clap,
}

impl EffectBackendType {
    /// Untranslated backend name, used in settings keys
    pub fn name(self) -> &'static str {
        match self {
            EffectBackendType::BuiltIn => "Built-In",
            EffectBackendType::Lv2 => "LV2",
            EffectBackendType::Clap => "CLAP",
        }
    }
}

/// Static description of a loadable effect
#[derive(Debug, Clone, PartialEq)]
pub struct EffectManifest {
    pub id: String,
    pub name: String,
    pub backend: EffectBackendType,
    /// Meta-parameter value used when a preset doesn't specify one
    pub default_meta_parameter: f64,
}

impl EffectManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, backend: EffectBackendType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            backend,
            default_meta_parameter: 0.5,
        }
    }

    pub fn with_default_meta_parameter(mut self, value: f64) -> Self {
        self.default_meta_parameter = value;
        self
    }

    /// Settings key holding this effect's visibility flag
    ///
    /// Effects from different backends may share ids, so the backend name
    /// is part of the group.
    pub fn visibility_key(&self) -> ConfigKey {
        ConfigKey::new(format!("[Visible {} Effects]", self.backend.name()), self.id.clone())
    }
}

/// Builds engine-side effect instances (control thread only)
pub trait EffectFactory: Send + Sync {
    fn instantiate(&self) -> Box<dyn EffectProcessor>;

    /// Fresh per-channel state for one instance
    fn create_state(&self) -> Box<dyn EffectState>;
}

/// Errors from effect lookup and instantiation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EffectError {
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Effect already registered: {0}")]
    DuplicateEffect(String),
}

/// A manifest together with its factory
#[derive(Clone)]
pub struct RegisteredEffect {
    pub manifest: Arc<EffectManifest>,
    pub factory: Arc<dyn EffectFactory>,
}

/// Catalogue of loadable effects, in registration order
#[derive(Default, Clone)]
pub struct EffectsRegistry {
    effects: Vec<RegisteredEffect>,
}

impl EffectsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in effects
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    pub fn register(
        &mut self,
        manifest: EffectManifest,
        factory: Arc<dyn EffectFactory>,
    ) -> Result<(), EffectError> {
        if self
            .effects
            .iter()
            .any(|e| e.manifest.id == manifest.id && e.manifest.backend == manifest.backend)
        {
            return Err(EffectError::DuplicateEffect(manifest.id));
        }
        log::debug!("EffectsRegistry: registered {} ({})", manifest.id, manifest.backend.name());
        self.effects.push(RegisteredEffect {
            manifest: Arc::new(manifest),
            factory,
        });
        Ok(())
    }

    /// Find an effect by id (first backend wins on id clashes)
    pub fn get(&self, id: &str) -> Result<&RegisteredEffect, EffectError> {
        self.effects
            .iter()
            .find(|e| e.manifest.id == id)
            .ok_or_else(|| EffectError::UnknownEffect(id.to_string()))
    }

    pub fn manifests(&self) -> impl Iterator<Item = &Arc<EffectManifest>> {
        self.effects.iter().map(|e| &e.manifest)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Which effects are offered in effect selectors
///
/// External plugins are hidden by default; built-ins are visible.
#[derive(Debug, Default, Clone)]
pub struct EffectVisibility {
    visible: HashMap<(EffectBackendType, String), bool>,
}

impl EffectVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_for(manifest: &EffectManifest) -> bool {
        manifest.backend == EffectBackendType::BuiltIn
    }

    pub fn is_visible(&self, manifest: &EffectManifest) -> bool {
        self.visible
            .get(&(manifest.backend, manifest.id.clone()))
            .copied()
            .unwrap_or_else(|| Self::default_for(manifest))
    }

    pub fn set_visible(&mut self, manifest: &EffectManifest, visible: bool) {
        self.visible
            .insert((manifest.backend, manifest.id.clone()), visible);
    }

    /// Restore flags for every registered effect from settings
    pub fn load(&mut self, registry: &EffectsRegistry, settings: &dyn SettingsProvider) {
        for manifest in registry.manifests() {
            let visible = settings.get_bool(&manifest.visibility_key(), Self::default_for(manifest));
            self.set_visible(manifest, visible);
        }
    }

    /// Persist flags for every registered effect
    pub fn save(&self, registry: &EffectsRegistry, settings: &mut dyn SettingsProvider) {
        for manifest in registry.manifests() {
            settings.set_bool(&manifest.visibility_key(), self.is_visible(manifest));
        }
    }

    /// Visible manifests, in registry order
    pub fn visible_effects<'a>(
        &'a self,
        registry: &'a EffectsRegistry,
    ) -> impl Iterator<Item = &'a Arc<EffectManifest>> + 'a {
        registry.manifests().filter(move |m| self.is_visible(m))
    }
}
